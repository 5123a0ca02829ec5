//! The phase-owning agents.

pub mod booking;
pub mod clinical;
pub mod intake;
pub mod monitoring;

pub use booking::BookingAgent;
pub use clinical::ClinicalAgent;
pub use intake::IntakeAgent;
pub use monitoring::MonitoringAgent;
