//! Parley: a signaling relay that lets browser peers meet in named rooms
//! and exchange WebRTC offers, answers and ICE candidates.

pub mod config;
pub mod signaling;
