//! The four agent workflows that drive sessions to completion: fan-out
//! calling (Blitz), IVR + hold navigation (Queue), live audio bridging
//! (CallFriend), and iterative site generation (Build). Each is a plain
//! async function taking an [`crate::app::AppContext`] and the session's
//! starting parameters — the `callforge-server` binary spawns one as a
//! detached task per incoming request and returns immediately with a
//! stream URL.

pub mod blitz;
pub mod build;
pub mod call_friend;
pub mod inbox;
pub mod queue;
