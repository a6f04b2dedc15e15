//! blogfront: client-side auth session and sign-in flow for the blog admin.
//!
//! SYSTEM CONTEXT
//! ==============
//! The blog store and the identity provider are remote HTTP services. This
//! crate owns everything between them on the client: where the session lives
//! (`session`, `storage`), how tokens arrive (`callback`, `identity`), how the
//! multi-step sign-in is sequenced (`flow`), who notices expiry (`watch`), and
//! how the bearer header reaches the content API (`content`).
//!
//! DESIGN
//! ======
//! There are no process globals. A front end builds one [`session::SessionStore`]
//! at startup and injects it into the flow controller, the watcher, and the
//! content client. Which store it builds (self-managed or provider-managed) is
//! a deployment choice carried by [`config::SessionStrategy`].

pub mod callback;
pub mod config;
pub mod content;
pub mod flow;
pub mod identity;
pub mod session;
pub mod storage;
pub mod watch;

#[cfg(test)]
mod test_helpers;
