//! Radio-less adapter.
//!
//! Used on hosts without a BLE stack: discovery yields nothing and every
//! connect attempt fails, so only the simulated device is usable.

use core::time::Duration;

use futures_lite::stream::{self, Empty};

use crate::app::ports::{Advertisement, BleAdapter, BleTransport};
use crate::cancel::CancelToken;
use crate::error::TransportError;

#[derive(Debug, Default, Clone, Copy)]
pub struct NullAdapter;

impl BleAdapter for NullAdapter {
    type Transport = NullTransport;
    type Scan = Empty<Advertisement>;

    fn scan(&self) -> Self::Scan {
        stream::empty()
    }

    fn transport_for(&self, _adv: &Advertisement) -> Self::Transport {
        NullTransport
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

impl BleTransport for NullTransport {
    async fn connect(&self, _timeout: Duration, _cancel: &CancelToken) -> Result<(), TransportError> {
        Err(TransportError::Connect("no BLE adapter".into()))
    }

    async fn cancel_connection(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn read_characteristic(
        &self,
        _service: u128,
        _characteristic: u128,
        _cancel: &CancelToken,
    ) -> Result<Vec<u8>, TransportError> {
        Err(TransportError::NotConnected)
    }

    async fn write_characteristic(
        &self,
        _service: u128,
        _characteristic: u128,
        _payload: &[u8],
    ) -> Result<(), TransportError> {
        Err(TransportError::NotConnected)
    }
}
