//! # Triage Gateway
//!
//! Event-driven orchestration from first patient contact to a confirmed,
//! monitored appointment:
//!
//! - **One diary per patient**: durable, versioned, never deleted
//! - **Phase-owning agents**: intake, clinical, booking, monitoring
//! - **Crash isolation**: an agent failure costs one event, never the gateway
//! - **Deterministic safety**: risk scoring never depends on an LLM
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Gateway                              │
//! │                                                              │
//! │  event ──▶ dedup ──▶ load diary ──▶ route ──▶ agent          │
//! │                                                │             │
//! │            ┌────────┐ ┌──────────┐ ┌─────────┐ │ ┌─────────┐ │
//! │            │ Intake │ │ Clinical │ │ Booking │◀┘ │ Monitor │ │
//! │            └────────┘ └──────────┘ └─────────┘   └─────────┘ │
//! │                                                │             │
//! │            save (CAS) ◀── responses/events ◀───┘             │
//! │               │                   │                          │
//! │               ▼                   ▼                          │
//! │          diary store       channel dispatch                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod agents;
pub mod config;
pub mod dispatch;
pub mod eventlog;
pub mod gateway;
pub mod registry;
pub mod text;

pub use agent::{Agent, AgentError, AgentResponse, AgentResult};
pub use config::GatewayConfig;
pub use dispatch::{ChannelDispatcher, DeliveryResult, DispatchRegistry, LoggingDispatcher};
pub use eventlog::{EventLog, EventLogEntry, ProcessingStatus};
pub use gateway::{Gateway, GatewayBuilder, GatewayError};
pub use registry::{SlotError, SlotRegistry};
