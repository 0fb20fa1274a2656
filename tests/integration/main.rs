//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against the scripted mock transport.  All tests run on the host with
//! no BLE hardware required.

mod manager_tests;
mod mock_transport;
mod physical_device_tests;
mod simulated_tests;
