// SPDX-License-Identifier: MIT
//
// C4 (raft stream layer), C5 (forwarding handler), C6 (applier), C9
// (leader loop) and C10 (FSM wrapper): the Raft-facing half of the
// coordination core.

pub mod applier;
pub mod fsm;
pub mod forward;
pub mod leader;
#[cfg(any(test, feature = "testing"))]
pub mod local_raft;
pub mod raft_layer;
pub mod traits;

pub use applier::{Applier, ApplierConfig};
pub use forward::ForwardHandler;
pub use fsm::FsmWrapper;
pub use leader::{LeaderLoop, LeaderLoopConfig};
#[cfg(any(test, feature = "testing"))]
pub use local_raft::LocalRaftHandle;
pub use raft_layer::RaftStreamLayer;
pub use traits::{ApplicationFsm, LeadershipHooks, NullApplicationFsm, NullLeadershipHooks, RaftHandle};
