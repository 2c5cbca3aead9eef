//! Bastion DNS Infrastructure Layer
//!
//! The forwarding core: request pipeline, access control, local names,
//! upstream exchange, and the adapters binding the collaborator ports to
//! the wire.
pub mod dns;
