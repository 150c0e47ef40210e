//! Session controller for a Game of Life whose generations are computed by a
//! remote render service.
//!
//! The board lives here; the rules do not. A [`SessionHandle`] owns the
//! board, runs the timed advance loop against a [`RenderGateway`], pauses
//! when a generation repeats and surfaces render failures.
//!
//! ```no_run
//! use conway::{GnoRenderGateway, ServiceConfig, SessionConfig, SessionHandle};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let gateway = GnoRenderGateway::new(&ServiceConfig::from_env()?)?;
//! let session = SessionHandle::spawn(SessionConfig::default(), gateway);
//! session.load_preset("glider").await?;
//! session.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod controller;
pub mod grid;
pub mod patterns;
pub mod render;
pub mod session;

pub use codec::{BoardCodec, CodecError, RowSeparator};
pub use config::{ConfigError, ServiceConfig, SessionConfig, SessionConfigBuilder};
pub use controller::SessionHandle;
pub use grid::{Board, Cell, Dimensions};
pub use patterns::{Preset, PRESETS};
pub use render::{GnoRenderGateway, RenderError, RenderGateway};
pub use session::{Completion, Session, SessionError, SessionSnapshot, SessionState};
