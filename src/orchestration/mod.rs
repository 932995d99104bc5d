// Request flow: validate -> dispatch -> aggregate

pub mod aggregator;
pub mod batch_orchestrator;
pub mod validator;

pub use aggregator::assemble;
pub use batch_orchestrator::BatchOrchestrator;
pub use validator::Validator;
