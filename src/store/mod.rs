//! Token store: cache, refresh token history, and the lookup that ties them
//! together.

pub mod cache;
pub mod persistent;
pub mod token_store;

pub use cache::{CachedEntry, MemoryTokenCache, TokenCache};
pub use persistent::{
    MemoryRefreshTokenStore, PersistedRefreshToken, PgRefreshTokenStore, RefreshTokenPersistence,
};
pub use token_store::{TokenStore, DEFAULT_MAX_ATTEMPTS};
