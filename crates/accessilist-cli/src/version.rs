/// Crate version plus the commit count and short sha it was built from.
pub const FULL: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "+git.",
    env!("ACCESSILIST_GIT_COUNT"),
    ".",
    env!("ACCESSILIST_GIT_SHA"),
    env!("ACCESSILIST_GIT_DIRTY")
);
