//! Type-token registry and the per-execution serialization configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use spillway_common::utils::error::CodecError;

use super::{MIN_TOKEN, ObjectSerializer};

/// Maps small integer tokens to object type names.
///
/// Tokens shrink the per-element type indicator from a full type name to a
/// one or two byte varint. Both directions are unique: a token names one type
/// and a type has at most one token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenRegistry {
    by_token: BTreeMap<u32, String>,
    by_name: HashMap<String, u32>,
}

impl TokenRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `token=TypeName` list separated by commas.
    ///
    /// ```
    /// use spillway_core::codec::TokenRegistry;
    ///
    /// let tokens = TokenRegistry::parse("1000=BooleanFlag, 10001=Text").unwrap();
    /// assert_eq!(tokens.token_for("Text"), Some(10001));
    /// assert_eq!(tokens.type_name_for(1000), Some("BooleanFlag"));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidTokenSpec`] for malformed entries, and the
    /// [`register`](Self::register) errors for conflicting ones.
    pub fn parse(spec: &str) -> Result<Self, CodecError> {
        let mut registry = Self::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (token, name) = entry
                .split_once('=')
                .ok_or_else(|| CodecError::InvalidTokenSpec(entry.to_string()))?;
            let token: u32 = token
                .trim()
                .parse()
                .map_err(|_| CodecError::InvalidTokenSpec(entry.to_string()))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(CodecError::InvalidTokenSpec(entry.to_string()));
            }
            registry.register(token, name)?;
        }
        Ok(registry)
    }

    /// Registers `type_name` under `token`.
    ///
    /// # Errors
    ///
    /// Fails if the token is below [`MIN_TOKEN`], if the token is already
    /// taken, or if the type already has a token.
    pub fn register(&mut self, token: u32, type_name: impl Into<String>) -> Result<(), CodecError> {
        let type_name = type_name.into();
        if token < MIN_TOKEN {
            return Err(CodecError::ReservedToken {
                token,
                type_name,
                min: MIN_TOKEN,
            });
        }
        if let Some(first) = self.by_token.get(&token) {
            return Err(CodecError::DuplicateToken {
                token,
                first: first.clone(),
                second: type_name,
            });
        }
        if let Some(&first) = self.by_name.get(&type_name) {
            return Err(CodecError::DuplicateTypeName {
                type_name,
                first,
                second: token,
            });
        }
        self.by_name.insert(type_name.clone(), token);
        self.by_token.insert(token, type_name);
        Ok(())
    }

    /// Returns the token registered for `type_name`.
    #[must_use]
    pub fn token_for(&self, type_name: &str) -> Option<u32> {
        self.by_name.get(type_name).copied()
    }

    /// Returns the type name registered under `token`.
    #[must_use]
    pub fn type_name_for(&self, token: u32) -> Option<&str> {
        self.by_token.get(&token).map(String::as_str)
    }

    /// Returns the number of registered tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    /// Returns `true` if no token is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }

    /// Iterates over `(token, type name)` pairs in token order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.by_token.iter().map(|(&t, n)| (t, n.as_str()))
    }
}

/// Immutable serialization configuration for one execution.
///
/// Built once with [`Serialization::builder`] and shared by reference with
/// every [`TupleCodec`](super::TupleCodec). Token lookups are resolved at build
/// time, so decoding a token never consults the name table.
#[derive(Clone, Default)]
pub struct Serialization {
    tokens: TokenRegistry,
    by_name: HashMap<String, Arc<dyn ObjectSerializer>>,
    by_token: HashMap<u32, Arc<dyn ObjectSerializer>>,
}

impl Serialization {
    /// Starts building a configuration.
    #[must_use]
    pub fn builder() -> SerializationBuilder {
        SerializationBuilder::default()
    }

    /// A configuration with no object types; only built-in values encode.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the token registry.
    #[must_use]
    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    /// Returns `true` if values of `type_name` can be encoded.
    #[must_use]
    pub fn can_encode(&self, type_name: &str) -> bool {
        match self.tokens.token_for(type_name) {
            Some(token) => self.by_token.contains_key(&token),
            None => self.by_name.contains_key(type_name),
        }
    }

    /// Returns the token and serializer used to write `type_name`, or the
    /// named serializer when the type has no token.
    pub(crate) fn writer_for(
        &self,
        type_name: &str,
    ) -> Result<(Option<u32>, &Arc<dyn ObjectSerializer>), CodecError> {
        let unregistered = || CodecError::UnregisteredType(type_name.to_string());
        match self.tokens.token_for(type_name) {
            Some(token) => self
                .by_token
                .get(&token)
                .map(|s| (Some(token), s))
                .ok_or_else(unregistered),
            None => self
                .by_name
                .get(type_name)
                .map(|s| (None, s))
                .ok_or_else(unregistered),
        }
    }

    pub(crate) fn reader_for_token(
        &self,
        token: u32,
    ) -> Result<&Arc<dyn ObjectSerializer>, CodecError> {
        self.by_token
            .get(&token)
            .ok_or(CodecError::UnknownToken(token))
    }

    pub(crate) fn reader_for_name(
        &self,
        type_name: &str,
    ) -> Result<&Arc<dyn ObjectSerializer>, CodecError> {
        self.by_name
            .get(type_name)
            .ok_or_else(|| CodecError::UnknownTypeName(type_name.to_string()))
    }
}

impl fmt::Debug for Serialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.by_name.keys().collect();
        names.sort();
        f.debug_struct("Serialization")
            .field("tokens", &self.tokens)
            .field("serializers", &names)
            .finish()
    }
}

/// Collects serializers and tokens; conflicts surface from [`build`](Self::build).
#[derive(Default)]
pub struct SerializationBuilder {
    tokens: Vec<(u32, String)>,
    token_specs: Vec<String>,
    serializers: Vec<Arc<dyn ObjectSerializer>>,
    token_serializers: Vec<(u32, Arc<dyn ObjectSerializer>)>,
}

impl SerializationBuilder {
    /// Registers a serializer under its type name.
    #[must_use]
    pub fn serializer(mut self, serializer: Arc<dyn ObjectSerializer>) -> Self {
        self.serializers.push(serializer);
        self
    }

    /// Assigns `token` to `type_name`.
    #[must_use]
    pub fn token(mut self, token: u32, type_name: impl Into<String>) -> Self {
        self.tokens.push((token, type_name.into()));
        self
    }

    /// Assigns tokens from a `token=TypeName,...` list.
    #[must_use]
    pub fn tokens_from_spec(mut self, spec: impl Into<String>) -> Self {
        self.token_specs.push(spec.into());
        self
    }

    /// Registers a serializer reachable only through `token`.
    ///
    /// The type gets the token but no name-based fallback entry.
    #[must_use]
    pub fn token_serializer(mut self, token: u32, serializer: Arc<dyn ObjectSerializer>) -> Self {
        self.token_serializers.push((token, serializer));
        self
    }

    /// Validates the collected registrations and freezes them.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when two types claim the same token, a
    /// type gets two tokens or two serializers, a token is reserved, or a token
    /// list is malformed.
    pub fn build(self) -> Result<Serialization, CodecError> {
        let mut tokens = TokenRegistry::new();
        for spec in &self.token_specs {
            for (token, name) in TokenRegistry::parse(spec)?.iter() {
                tokens.register(token, name)?;
            }
        }
        for (token, name) in self.tokens {
            tokens.register(token, name)?;
        }

        let mut by_name: HashMap<String, Arc<dyn ObjectSerializer>> = HashMap::new();
        for serializer in self.serializers {
            let name = serializer.type_name().to_string();
            if by_name.contains_key(&name) {
                return Err(CodecError::DuplicateSerializer(name));
            }
            by_name.insert(name, serializer);
        }

        let mut by_token: HashMap<u32, Arc<dyn ObjectSerializer>> = HashMap::new();
        for (token, serializer) in self.token_serializers {
            tokens.register(token, serializer.type_name())?;
            by_token.insert(token, serializer);
        }
        for (token, name) in tokens.iter() {
            if let Some(serializer) = by_name.get(name) {
                by_token.entry(token).or_insert_with(|| Arc::clone(serializer));
            }
        }

        Ok(Serialization {
            tokens,
            by_name,
            by_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BincodeSerializer;
    use serde::{Deserialize, Serialize};
    use spillway_common::types::ObjectType;

    #[derive(Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    struct Text(String);

    impl ObjectType for Text {
        const TYPE_NAME: &'static str = "Text";
    }

    #[test]
    fn test_parse_tokens() {
        let tokens = TokenRegistry::parse("1000=BooleanFlag,10001=Text").unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens.token_for("BooleanFlag"), Some(1000));
        assert_eq!(tokens.type_name_for(10001), Some("Text"));
        assert!(TokenRegistry::parse("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for spec in ["1000", "abc=Text", "1000=", "=Text"] {
            assert!(
                matches!(TokenRegistry::parse(spec), Err(CodecError::InvalidTokenSpec(_))),
                "spec {spec:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_duplicate_token() {
        let err = TokenRegistry::parse("1000=A,1000=B").unwrap_err();
        assert!(matches!(err, CodecError::DuplicateToken { token: 1000, .. }));
    }

    #[test]
    fn test_duplicate_type_name() {
        let err = TokenRegistry::parse("1000=A,1001=A").unwrap_err();
        assert!(matches!(err, CodecError::DuplicateTypeName { .. }));
    }

    #[test]
    fn test_reserved_token() {
        let err = TokenRegistry::parse("7=A").unwrap_err();
        assert!(matches!(err, CodecError::ReservedToken { token: 7, .. }));
    }

    #[test]
    fn test_build_conflict_across_sources() {
        let err = Serialization::builder()
            .tokens_from_spec("1000=A")
            .token(1000, "B")
            .build()
            .unwrap_err();
        assert!(matches!(err, CodecError::DuplicateToken { .. }));
    }

    #[test]
    fn test_duplicate_serializer() {
        let err = Serialization::builder()
            .serializer(BincodeSerializer::<Text>::shared())
            .serializer(BincodeSerializer::<Text>::shared())
            .build()
            .unwrap_err();
        assert!(matches!(err, CodecError::DuplicateSerializer(_)));
    }

    #[test]
    fn test_token_without_serializer_is_accepted() {
        let serialization = Serialization::builder()
            .tokens_from_spec("10001=Text")
            .build()
            .unwrap();
        assert_eq!(serialization.tokens().token_for("Text"), Some(10001));
        assert!(!serialization.can_encode("Text"));
        assert!(matches!(
            serialization.writer_for("Text"),
            Err(CodecError::UnregisteredType(_))
        ));
    }

    #[test]
    fn test_writer_prefers_token() {
        let serialization = Serialization::builder()
            .serializer(BincodeSerializer::<Text>::shared())
            .token(10001, "Text")
            .build()
            .unwrap();
        let (token, _) = serialization.writer_for("Text").unwrap();
        assert_eq!(token, Some(10001));
    }
}
