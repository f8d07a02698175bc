//! Admission control primitives for retry policies.
//!
//! A retry strategy spends tokens from a [`TokenBucket`] before retrying and
//! gives them back on success. When a bucket runs dry, retries stop, which
//! acts as a circuit breaker for an unhealthy scope. Buckets are looked up per
//! caller chosen scope (for example `"s3/us-east-1"`) through a
//! [`TokenBucketStore`].
//!
//! ```
//! use awsign_retry::TokenBucketStore;
//!
//! let store = TokenBucketStore::new();
//! let bucket = store.bucket_for("s3/us-east-1");
//!
//! let acquired = bucket.try_acquire(5);
//! assert!(!acquired.acquisition_failed());
//! assert_eq!(acquired.capacity_remaining(), 495);
//!
//! bucket.release(5);
//! assert_eq!(bucket.current_capacity(), 500);
//! ```

#![warn(missing_docs)]

mod token_bucket;
pub use token_bucket::{AcquireResponse, ReleaseResponse, TokenBucket};

mod store;
pub use store::{TokenBucketStore, DEFAULT_MAX_CAPACITY, DEFAULT_STORE_CAPACITY};
