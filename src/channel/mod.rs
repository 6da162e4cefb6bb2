mod hub;
mod link;
pub mod messages;
mod port;
mod supervisor;


pub use hub::ConnectionHub;
pub use link::{Outbox, SessionLink};
pub use messages::{ControllerCommand, SessionEvent, SessionMessage, KEEPALIVE_PORT};
pub use port::{pair, PortEnd, PortReader, PortWriter};
pub use supervisor::{ChannelSupervisor, ConnectionInfo, SupervisorEvent};
