pub mod ancestry;
pub mod backend;
pub mod catalog;
pub mod discovery;
pub mod endpoint;
pub mod enumerate;
pub mod inventory;
pub mod session;
pub mod simulator;
pub mod types;

pub use backend::{Backend, Connection, Credentials};
pub use discovery::InventoryDiscoverer;
pub use endpoint::Endpoint;
pub use session::{ClientSession, SessionManager};
pub use simulator::Simulator;
