//! Loader capability
//!
//! The source of truth a group falls back to on a miss it owns.

use std::future::Future;

use async_trait::async_trait;

use crate::error::Result;

/// Produces the bytes for a key
///
/// Called at most once at a time per key and group; implementations must
/// tolerate concurrent calls for different keys.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Load the value for `key`
    async fn load(&self, key: &str) -> Result<Vec<u8>>;
}

/// Adapts an async closure into a [`Loader`]
pub struct LoaderFn<F> {
    f: F,
}

impl<F> LoaderFn<F> {
    /// Wrap a closure
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Loader for LoaderFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<u8>>> + Send,
{
    async fn load(&self, key: &str) -> Result<Vec<u8>> {
        (self.f)(key.to_string()).await
    }
}

/// Shorthand for `LoaderFn::new`
pub fn loader_fn<F, Fut>(f: F) -> LoaderFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<u8>>> + Send,
{
    LoaderFn::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct Upper;

    #[async_trait]
    impl Loader for Upper {
        async fn load(&self, key: &str) -> Result<Vec<u8>> {
            Ok(key.to_uppercase().into_bytes())
        }
    }

    #[tokio::test]
    async fn test_struct_loader() {
        assert_eq!(Upper.load("tom").await.unwrap(), b"TOM");
    }

    #[tokio::test]
    async fn test_closure_loader() {
        let loader = loader_fn(|key: String| async move {
            if key == "missing" {
                Err(Error::loader(format!("{} not exist", key)))
            } else {
                Ok(key.into_bytes())
            }
        });

        assert_eq!(loader.load("key").await.unwrap(), b"key");
        assert_eq!(
            loader.load("missing").await.unwrap_err(),
            Error::Loader("missing not exist".to_string())
        );
    }
}
