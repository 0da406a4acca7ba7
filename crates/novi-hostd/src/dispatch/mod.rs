//! JSONL control surface served on the control socket.
//!
//! ## Protocol
//!
//! A client sends one request line and reads response lines until an `exit`
//! message:
//!
//! ```json
//! {"method":"plugin.restart","identity":"<session token>","arguments":{"plugin":"b"}}
//! ```
//!
//! ```json
//! {"kind":"result","data":{"restarted":["c","b"]}}
//! {"kind":"exit","status":0}
//! ```
//!
//! Failures produce an `error` message carrying a stable `code` before the
//! `exit`. Every method requires the session named by `identity` to hold the
//! permission of the same name.

mod errors;
mod handler;
mod request;
mod response;
mod router;

pub use self::errors::DispatchError;
pub use self::handler::ControlConnectionHandler;
pub use self::request::{ControlRequest, Method, RequestArguments};
pub use self::response::{HostMessage, ResponseWriter};

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
