pub mod gate;
pub mod module;
pub mod router;
pub mod session;
pub mod state;

pub use gate::TimingGate;
pub use module::SyncModule;
pub use router::{Router, RouterControl, RouterSummary};
pub use session::TrialPaths;
pub use state::SessionState;
