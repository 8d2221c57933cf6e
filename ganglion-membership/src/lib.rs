// SPDX-License-Identifier: MIT
//
// C7 (membership) and C8 (event bridge / reconciler gate).

pub mod bridge;
pub mod gossip;
pub mod merge;
pub mod types;

pub use bridge::{EventBridge, MembershipHooks, ReconcileFlags};
pub use gossip::{Membership, MembershipConfig};
pub use types::MembershipEvent;
