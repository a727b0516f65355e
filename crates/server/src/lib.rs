pub mod bus;
pub mod dispatcher;
pub mod instance;
pub mod params;
pub mod rabbitmq;
pub mod server;

pub use bus::{bus_channels, BusAdapter, BusEventSenders, BusEvents};
pub use dispatcher::CommandProcessor;
pub use instance::SingleInstance;
pub use rabbitmq::RabbitMqAdapter;
pub use server::TerminalGraphServer;
