//! Typed payload carrier for messages crossing the transport.
//!
//! A transport consumer only sees bytes; the [`Payload`] discriminant lets it
//! rebuild the concrete entity on receipt without any runtime type lookup.
//! [`Envelope`] additionally records the [`EntityKind`] observed at
//! construction.
//!
//! ## Tag staleness
//!
//! [`Envelope::set`] replaces the payload but keeps the tag captured by
//! [`Envelope::new`]. Consumers that care can detect a divergence with
//! [`Envelope::is_consistent`].

use serde::{Deserialize, Serialize};

use crate::models::{
    MaterialDefinition, Pipeline, PipelineDefinition, User, UserGroup, UserGroupMembers,
};

/// Discriminant over the entity kinds that can travel in a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Empty,
    PipelineDefinition,
    Pipeline,
    MaterialDefinition,
    User,
    UserGroup,
    UserGroupMembers,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Empty => "Empty",
            EntityKind::PipelineDefinition => "PipelineDefinition",
            EntityKind::Pipeline => "Pipeline",
            EntityKind::MaterialDefinition => "MaterialDefinition",
            EntityKind::User => "User",
            EntityKind::UserGroup => "UserGroup",
            EntityKind::UserGroupMembers => "UserGroupMembers",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The value carried by an envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Payload {
    #[default]
    Empty,
    PipelineDefinition(PipelineDefinition),
    Pipeline(Pipeline),
    MaterialDefinition(MaterialDefinition),
    User(User),
    UserGroup(UserGroup),
    UserGroupMembers(UserGroupMembers),
}

impl Payload {
    pub fn kind(&self) -> EntityKind {
        match self {
            Payload::Empty => EntityKind::Empty,
            Payload::PipelineDefinition(_) => EntityKind::PipelineDefinition,
            Payload::Pipeline(_) => EntityKind::Pipeline,
            Payload::MaterialDefinition(_) => EntityKind::MaterialDefinition,
            Payload::User(_) => EntityKind::User,
            Payload::UserGroup(_) => EntityKind::UserGroup,
            Payload::UserGroupMembers(_) => EntityKind::UserGroupMembers,
        }
    }

    /// Returns the user record if this payload carries one.
    pub fn as_user(&self) -> Option<&User> {
        match self {
            Payload::User(user) => Some(user),
            _ => None,
        }
    }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Payload::Empty)
    }
}

macro_rules! payload_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Payload {
                fn from(value: $variant) -> Self {
                    Payload::$variant(value)
                }
            }
        )*
    };
}

payload_from!(
    PipelineDefinition,
    Pipeline,
    MaterialDefinition,
    User,
    UserGroup,
    UserGroupMembers,
);

/// Payload plus the kind tag recorded when the envelope was built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    type_tag: EntityKind,
    payload: Payload,
}

impl Envelope {
    /// Wraps `value`, capturing its kind.
    pub fn new(value: impl Into<Payload>) -> Self {
        let payload = value.into();
        Self {
            type_tag: payload.kind(),
            payload,
        }
    }

    pub fn empty() -> Self {
        Self::new(Payload::Empty)
    }

    /// Current payload.
    pub fn get(&self) -> &Payload {
        &self.payload
    }

    /// Replaces the payload. The recorded tag is left untouched.
    pub fn set(&mut self, value: impl Into<Payload>) {
        self.payload = value.into();
    }

    /// Kind recorded at construction.
    pub fn type_tag(&self) -> EntityKind {
        self.type_tag
    }

    /// Returns `false` once [`set`](Self::set) stored a payload of another kind.
    pub fn is_consistent(&self) -> bool {
        self.type_tag == self.payload.kind()
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_captures_kind() {
        let envelope = Envelope::new(PipelineDefinition::new("build"));
        assert_eq!(envelope.type_tag(), EntityKind::PipelineDefinition);
        assert!(matches!(envelope.get(), Payload::PipelineDefinition(d) if d.name == "build"));
        assert!(envelope.is_consistent());
    }

    #[test]
    fn test_set_keeps_original_tag() {
        let mut envelope = Envelope::new(PipelineDefinition::new("build"));
        envelope.set(User::new("a@example.com"));

        assert_eq!(envelope.type_tag(), EntityKind::PipelineDefinition);
        assert_eq!(envelope.get().kind(), EntityKind::User);
        assert!(!envelope.is_consistent());
    }

    #[test]
    fn test_none_becomes_empty_payload() {
        let envelope = Envelope::new(None::<User>);
        assert_eq!(envelope.type_tag(), EntityKind::Empty);
        assert_eq!(envelope.get(), &Payload::Empty);
    }

    #[test]
    fn test_envelope_recovers_kind_from_bytes() {
        let user = User::new("ops@example.com");
        let json = serde_json::to_string(&Envelope::new(user.clone())).unwrap();
        assert!(json.contains(r#""typeTag":"USER""#));

        let decoded: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.type_tag(), EntityKind::User);
        assert_eq!(decoded.get().as_user(), Some(&user));
    }
}
