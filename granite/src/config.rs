//! Storage configuration.
//!
//! Values come from [`StorageConfig::default`] and may be overridden through
//! `GRANITE_PAGE_SIZE` and `GRANITE_POOL_PAGES`.

use std::env;

use crate::error::StorageError;

pub const DEFAULT_PAGE_SIZE: usize = 4096;
pub const DEFAULT_POOL_PAGES: usize = 50;

pub const PAGE_SIZE_VAR: &str = "GRANITE_PAGE_SIZE";
pub const POOL_PAGES_VAR: &str = "GRANITE_POOL_PAGES";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageConfig {
    /// Size of every page in bytes. Fixed for the life of a buffer pool.
    pub page_size: usize,
    /// Maximum number of pages the buffer pool keeps in memory.
    pub pool_pages: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            pool_pages: DEFAULT_POOL_PAGES,
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, StorageError> {
        let mut config = Self::default();
        if let Some(page_size) = read_var(PAGE_SIZE_VAR)? {
            config.page_size = page_size;
        }
        if let Some(pool_pages) = read_var(POOL_PAGES_VAR)? {
            config.pool_pages = pool_pages;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_pool_pages(mut self, pool_pages: usize) -> Self {
        self.pool_pages = pool_pages;
        self
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        if self.page_size == 0 {
            return Err(StorageError::Config("page size must be positive".into()));
        }
        if self.pool_pages == 0 {
            return Err(StorageError::Config(
                "buffer pool needs at least one frame".into(),
            ));
        }
        Ok(())
    }
}

fn read_var(name: &str) -> Result<Option<usize>, StorageError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|e| StorageError::Config(format!("{name}={raw:?}: {e}"))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(StorageError::Config(format!("{name}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_vars() {
        env::remove_var(PAGE_SIZE_VAR);
        env::remove_var(POOL_PAGES_VAR);
    }

    #[test]
    #[serial]
    fn defaults_without_env() {
        clear_vars();
        let config = StorageConfig::from_env().unwrap();
        assert_eq!(config, StorageConfig::default());
        assert_eq!(config.page_size, 4096);
    }

    #[test]
    #[serial]
    fn env_overrides_defaults() {
        clear_vars();
        env::set_var(PAGE_SIZE_VAR, "1024");
        env::set_var(POOL_PAGES_VAR, " 8 ");
        let config = StorageConfig::from_env().unwrap();
        clear_vars();
        assert_eq!(config.page_size, 1024);
        assert_eq!(config.pool_pages, 8);
    }

    #[test]
    #[serial]
    fn rejects_bad_values() {
        clear_vars();
        env::set_var(PAGE_SIZE_VAR, "big");
        assert!(matches!(
            StorageConfig::from_env(),
            Err(StorageError::Config(_))
        ));
        env::set_var(PAGE_SIZE_VAR, "0");
        assert!(matches!(
            StorageConfig::from_env(),
            Err(StorageError::Config(_))
        ));
        clear_vars();
    }
}
