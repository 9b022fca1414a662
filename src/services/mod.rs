//! Application services

pub mod magic_link;

pub use magic_link::{
    ActionInfo, IssuedLink, LinkRequest, LinkRequestOutcome, MagicLinkConfig, MagicLinkService,
    MAX_BULK_ASSETS,
};
