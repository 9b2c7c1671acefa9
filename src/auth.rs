// Bearer token caching for secured deployments
// Copyright © 2025 Hs293Go
//
// Permission is hereby granted, free of charge, to any person obtaining
// a copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included
// in all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND,
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES
// OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT.
// IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
// DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT,
// TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE
// OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::interfaces::TransportError;

/// An access token with a known expiry
#[derive(Debug)]
pub struct BearerToken {
    secret: SecretString,
    expires_at: DateTime<Utc>,
}

impl BearerToken {
    /// Wraps a raw token string
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret: SecretString::new(token.into()),
            expires_at,
        }
    }

    /// Instant after which the token is rejected
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Value for an `Authorization` header
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.secret.expose_secret())
    }

    /// Whether the token is still valid for at least `margin` after `now`
    pub fn is_valid_for(&self, now: DateTime<Utc>, margin: TimeDelta) -> bool {
        now + margin <= self.expires_at
    }
}

/// Issues access tokens, e.g. through an OAuth client-credentials grant
pub trait CredentialProvider {
    /// Requests a new token
    fn fetch_token(&mut self) -> Result<BearerToken, TransportError>;
}

impl<P: CredentialProvider + ?Sized> CredentialProvider for Box<P> {
    fn fetch_token(&mut self) -> Result<BearerToken, TransportError> {
        (**self).fetch_token()
    }
}

/// Keeps a token and renews it once its remaining validity drops below a threshold.
pub struct TokenCache<P> {
    provider: P,
    token: Option<BearerToken>,
    min_validity: TimeDelta,
}

impl<P: CredentialProvider> TokenCache<P> {
    /// Creates an empty cache; the first call to `ensure_fresh` fetches a token
    pub fn new(provider: P, min_validity: TimeDelta) -> Self {
        Self {
            provider,
            token: None,
            min_validity,
        }
    }

    /// Returns a token valid for at least the configured threshold after `now`, fetching a new
    /// one if needed.
    pub fn ensure_fresh(&mut self, now: DateTime<Utc>) -> Result<&BearerToken, TransportError> {
        let stale = self
            .token
            .as_ref()
            .map_or(true, |token| !token.is_valid_for(now, self.min_validity));
        if stale {
            debug!("renewing access token");
            self.token = Some(self.provider.fetch_token()?);
        }
        self.token
            .as_ref()
            .ok_or_else(|| TransportError::Failure("credential provider returned no token".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingProvider {
        fetched: u32,
        lifetime: TimeDelta,
        now: DateTime<Utc>,
    }

    impl CredentialProvider for CountingProvider {
        fn fetch_token(&mut self) -> Result<BearerToken, TransportError> {
            self.fetched += 1;
            Ok(BearerToken::new(
                format!("token-{}", self.fetched),
                self.now + self.lifetime,
            ))
        }
    }

    #[test]
    fn test_token_renewed_only_near_expiry() {
        let start = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let provider = CountingProvider {
            fetched: 0,
            lifetime: TimeDelta::seconds(300),
            now: start,
        };
        let mut cache = TokenCache::new(provider, TimeDelta::seconds(60));

        let token = cache.ensure_fresh(start).unwrap();
        assert_eq!(token.header_value(), "Bearer token-1");

        // 200s in, 100s of validity left: keep
        let token = cache.ensure_fresh(start + TimeDelta::seconds(200)).unwrap();
        assert_eq!(token.header_value(), "Bearer token-1");

        // 250s in, only 50s left: renew
        let token = cache.ensure_fresh(start + TimeDelta::seconds(250)).unwrap();
        assert_eq!(token.header_value(), "Bearer token-2");
    }

    #[test]
    fn test_boxed_provider() {
        let start = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let provider: Box<dyn CredentialProvider + Send> = Box::new(CountingProvider {
            fetched: 0,
            lifetime: TimeDelta::seconds(300),
            now: start,
        });
        let mut cache = TokenCache::new(provider, TimeDelta::seconds(60));

        let token = cache.ensure_fresh(start).unwrap();
        assert_eq!(token.header_value(), "Bearer token-1");
        assert_eq!(token.expires_at(), start + TimeDelta::seconds(300));
    }
}
