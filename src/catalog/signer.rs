/// Request signing for the upstream catalog gateway
///
/// Construction is a fixed external protocol:
///   1. drop parameters with empty values
///   2. sort names by raw byte order
///   3. concatenate name + value pairs with no separators
///   4. uppercase hex MD5 of secret + base + secret
///
/// Any deviation is rejected upstream as an authentication failure.

use std::collections::BTreeMap;

use md5::{Digest, Md5};

/// Ordered, empty-free parameter set for one outbound call.
///
/// `BTreeMap<String, _>` orders keys by raw byte comparison, which is exactly
/// the ordering the signature needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Params(BTreeMap::new())
    }

    /// Insert a parameter. Empty values are skipped.
    pub fn insert(&mut self, name: &str, value: impl ToString) -> &mut Self {
        let value = value.to_string();
        if !value.is_empty() {
            self.0.insert(name.to_string(), value);
        }
        self
    }

    /// Insert an optional parameter. `None` and empty values are skipped.
    pub fn insert_opt<V: ToString>(&mut self, name: &str, value: Option<V>) -> &mut Self {
        if let Some(v) = value {
            self.insert(name, v);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Compute the gateway signature for any name/value mapping.
///
/// Insertion order of `params` is irrelevant. Pairs with an empty value are
/// excluded before signing.
pub fn sign<I, K, V>(params: I, secret: &str) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let sorted: BTreeMap<String, String> = params
        .into_iter()
        .filter(|(_, v)| !v.as_ref().is_empty())
        .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
        .collect();

    let mut hasher = Md5::new();
    hasher.update(secret.as_bytes());
    for (name, value) in &sorted {
        hasher.update(name.as_bytes());
        hasher.update(value.as_bytes());
    }
    hasher.update(secret.as_bytes());

    format!("{:X}", hasher.finalize())
}

/// Holds the shared secret so callers never pass it around per request.
#[derive(Clone)]
pub struct RequestSigner {
    secret: String,
}

impl RequestSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        RequestSigner { secret: secret.into() }
    }

    /// Sign `params` and insert the result under `sign`.
    pub fn sign_into(&self, params: &mut Params) {
        let signature = sign(params.iter(), &self.secret);
        params.insert("sign", signature);
    }
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner").field("secret", &"***").finish()
    }
}
