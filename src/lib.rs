//! Lookout - camera vision assistant
//!
//! Lookout watches a camera, narrates what it sees, and answers spoken or
//! typed questions about the scene. Capture, analysis, voice input, and
//! speech output all run through one session controller so that only one
//! analysis, one listening session, and one utterance are ever live.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  CLI (lookout)                   │
//! │   watch  │  describe  │  ask  │  listen  │  ... │
//! └───────────────────────┬─────────────────────────┘
//!                         │
//! ┌───────────────────────▼─────────────────────────┐
//! │              Session controller                  │
//! │  scan timer │ analysis │ voice │ speech arbiter │
//! └───────────────────────┬─────────────────────────┘
//!                         │
//! ┌───────────────────────▼─────────────────────────┐
//! │              Vision backend (HTTP)               │
//! │  analyze-scene │ ask-question │ transcribe-audio│
//! └─────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod camera;
pub mod config;
pub mod error;
pub mod session;
pub mod speech;
pub mod voice;

pub use backend::{HttpBackend, RemoteAssistant};
pub use camera::{Frame, FrameSource};
pub use config::Config;
pub use error::{Error, Result};
pub use session::{SessionController, SessionHandle, SessionOptions, StatusSnapshot};
