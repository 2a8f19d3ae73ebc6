// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// Bucket and key of an object store URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudLocation {
    /// `s3` or `gs`
    pub scheme: String,
    pub bucket: String,
    /// Key without a leading slash; directories end with `/`
    pub key: String,
}

impl CloudLocation {
    #[must_use]
    pub fn is_s3(&self) -> bool {
        self.scheme == "s3"
    }

    #[must_use]
    pub fn is_gcs(&self) -> bool {
        self.scheme == "gs"
    }
}

impl fmt::Display for CloudLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.key)
    }
}

/// AWS credentials attached to `s3://` URLs
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCreds {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCreds {
    /// Long-lived credentials carry no session token
    #[must_use]
    pub fn is_long_lived(&self) -> bool {
        self.session_token.is_none()
    }
}

impl fmt::Debug for AwsCreds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCreds")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
