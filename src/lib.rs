#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

pub mod config;
pub mod error;
pub mod headers;
pub mod logs;
pub mod render_checker;
pub mod request;
pub mod server;
pub mod suite;
pub mod utils;

pub use config::CheckerConfig;
pub use error::CheckError;
pub use headers::HeaderMap;
pub use render_checker::{DiffOutcome, DiffResult, RenderChecker, SizeTolerance};
pub use request::{RequestConfig, RequestMethod, ServerParameters, WmsQuery};
pub use server::{AccessControlFilter, EmbeddedServer, RawResponse, RequestHandler, ServerInterface};
pub use suite::SuiteContext;
