//! slopbot: turn social media links into uploaded media
//!
//! Watches chat messages for iFunny, Instagram, TikTok and Twitter/X links,
//! resolves each to the raw image/video/gif behind it, and re-uploads that
//! asset instead of leaving a bare link.

pub mod bot;
pub mod chat;
pub mod delivery;
pub mod discord;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod heic;
pub mod media;
pub mod oneshot;
pub mod resolvers;

pub use chat::{handle_message, ChatChannel, Handled, IncomingMessage};
pub use delivery::{deliver, Delivered, MAX_UPLOAD_BYTES};
pub use dispatch::Dispatcher;
pub use error::{DeliveryError, ResolveError};
pub use fetch::Fetcher;
pub use media::{CandidateSet, ResolvedMedia};
pub use resolvers::{Resolver, SiteProfile};
