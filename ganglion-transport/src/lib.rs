// SPDX-License-Identifier: MIT
//
// C2 (connection pool & dialer) and C3 (stream dispatcher): the outbound
// and inbound halves of the single TLS-multiplexed transport spec.md
// describes in §1 and §6.

pub mod deadline;
pub mod dispatcher;
pub mod handler;
pub mod pool;
pub mod session;
pub mod stream;
pub mod tls;

pub use deadline::{Deadline, DeadlineError};
pub use dispatcher::Dispatcher;
pub use handler::StreamHandler;
pub use pool::ConnectionPool;
pub use session::Session;
pub use stream::GanglionStream;
