pub mod backend;
pub mod catalog;
pub mod error;
pub mod executor;
pub mod requests;
pub mod results;
pub mod simulated;

pub use backend::ChainBackend;
pub use error::{ArgumentError, BackendError, ExecutionError};
pub use executor::Executor;
pub use requests::CapabilityRequest;
pub use results::CapabilityResult;
pub use simulated::{SimulatedChain, NATIVE_SYMBOL};
