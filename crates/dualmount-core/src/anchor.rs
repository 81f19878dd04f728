#![forbid(unsafe_code)]

//! Anchor identities, owner tags, and the closed anchor catalog.
//!
//! An anchor ("sacred mount") is a named, singleton UI insertion point that
//! exactly one implementation may render into at a time. Anchors are drawn
//! from a closed set known when the shell is built; [`AnchorCatalog`] is
//! that set together with each anchor's `required` flag.

use std::borrow::Cow;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::MountError;

// ---------------------------------------------------------------------------
// AnchorId
// ---------------------------------------------------------------------------

/// Stable identifier of a named anchor.
///
/// Identifiers are kebab-case (`[a-z0-9-]`, non-empty). The standard anchors
/// are available as associated constants and cost nothing to clone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct AnchorId(Cow<'static, str>);

impl AnchorId {
    /// Bottom navigation bar.
    pub const BOTTOM_NAV: Self = Self(Cow::Borrowed("bottom-nav"));
    /// Floating action button.
    pub const FAB: Self = Self(Cow::Borrowed("fab"));
    /// Top app bar.
    pub const TOP_BAR: Self = Self(Cow::Borrowed("top-bar"));
    /// Full-screen modal host.
    pub const MODAL_OVERLAY: Self = Self(Cow::Borrowed("modal-overlay"));

    /// Parse and validate an anchor id.
    pub fn new(id: impl Into<String>) -> Result<Self, MountError> {
        let id = id.into();
        validate_id(&id)?;
        Ok(Self(Cow::Owned(id)))
    }

    /// Build an anchor id from a static literal.
    pub fn from_static(id: &'static str) -> Result<Self, MountError> {
        validate_id(id)?;
        Ok(Self(Cow::Borrowed(id)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_id(id: &str) -> Result<(), MountError> {
    if id.is_empty() {
        return Err(MountError::InvalidAnchorId {
            id: id.to_string(),
            reason: "anchor id must not be empty",
        });
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(MountError::InvalidAnchorId {
            id: id.to_string(),
            reason: "anchor id must contain only [a-z0-9-]",
        });
    }
    if id.starts_with('-') || id.ends_with('-') {
        return Err(MountError::InvalidAnchorId {
            id: id.to_string(),
            reason: "anchor id must not start or end with '-'",
        });
    }
    Ok(())
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AnchorId {
    type Error = MountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AnchorId> for String {
    fn from(id: AnchorId) -> Self {
        id.0.into_owned()
    }
}

// ---------------------------------------------------------------------------
// OwnerRef
// ---------------------------------------------------------------------------

/// Tag naming the implementation variant that holds an anchor.
///
/// Carries no behavior; only compared for equality and written to logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "String", into = "String"))]
pub enum OwnerRef {
    /// The legacy view tree.
    Legacy,
    /// The next-gen view tree.
    NextGen,
    /// Any other implementation (experiments, test doubles).
    Custom(Cow<'static, str>),
}

impl OwnerRef {
    #[must_use]
    pub fn custom(tag: impl Into<Cow<'static, str>>) -> Self {
        Self::Custom(tag.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Legacy => "legacy",
            Self::NextGen => "nextgen",
            Self::Custom(tag) => tag,
        }
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for OwnerRef {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "legacy" => Self::Legacy,
            "nextgen" | "next-gen" => Self::NextGen,
            _ => Self::Custom(Cow::Owned(tag)),
        }
    }
}

impl From<OwnerRef> for String {
    fn from(owner: OwnerRef) -> Self {
        owner.as_str().to_string()
    }
}

// ---------------------------------------------------------------------------
// AnchorSpec / AnchorCatalog
// ---------------------------------------------------------------------------

/// Static descriptor of one anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnchorSpec {
    pub id: AnchorId,
    /// Must have exactly one owner before the shell is ready.
    #[cfg_attr(feature = "serde", serde(default))]
    pub required: bool,
}

impl AnchorSpec {
    #[must_use]
    pub const fn required(id: AnchorId) -> Self {
        Self { id, required: true }
    }

    #[must_use]
    pub const fn optional(id: AnchorId) -> Self {
        Self {
            id,
            required: false,
        }
    }
}

/// The closed set of anchors a shell declares.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct AnchorCatalog {
    specs: Vec<AnchorSpec>,
}

impl AnchorCatalog {
    #[must_use]
    pub fn new(specs: Vec<AnchorSpec>) -> Self {
        Self { specs }
    }

    /// The four sacred mounts of the mobile shell.
    ///
    /// `modal-overlay` is optional: the shell can be ready before any modal
    /// host has mounted.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(vec![
            AnchorSpec::required(AnchorId::BOTTOM_NAV),
            AnchorSpec::required(AnchorId::FAB),
            AnchorSpec::required(AnchorId::TOP_BAR),
            AnchorSpec::optional(AnchorId::MODAL_OVERLAY),
        ])
    }

    #[must_use]
    pub fn specs(&self) -> &[AnchorSpec] {
        &self.specs
    }

    pub fn ids(&self) -> impl Iterator<Item = &AnchorId> {
        self.specs.iter().map(|spec| &spec.id)
    }

    #[must_use]
    pub fn get(&self, id: &AnchorId) -> Option<&AnchorSpec> {
        self.specs.iter().find(|spec| &spec.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Ids that appear more than once, in first-seen order.
    #[must_use]
    pub fn duplicates(&self) -> Vec<AnchorId> {
        let mut seen: Vec<&AnchorId> = Vec::with_capacity(self.specs.len());
        let mut dups = Vec::new();
        for spec in &self.specs {
            if seen.contains(&&spec.id) {
                if !dups.contains(&spec.id) {
                    dups.push(spec.id.clone());
                }
            } else {
                seen.push(&spec.id);
            }
        }
        dups
    }
}


#[cfg(all(test, feature = "serde"))]
mod serde_tests {
    use super::*;

    #[test]
    fn catalog_serializes_as_plain_list() {
        let json = serde_json::to_string(&AnchorCatalog::new(vec![AnchorSpec::required(
            AnchorId::FAB,
        )]))
        .unwrap();
        assert_eq!(json, r#"[{"id":"fab","required":true}]"#);
    }

    #[test]
    fn deserializing_validates_anchor_ids() {
        let err = serde_json::from_str::<AnchorId>(r#""Top Bar""#).unwrap_err();
        assert!(err.to_string().contains("invalid anchor id"));

        let spec: AnchorSpec = serde_json::from_str(r#"{"id":"modal-overlay"}"#).unwrap();
        assert_eq!(spec, AnchorSpec::optional(AnchorId::MODAL_OVERLAY));
    }

    #[test]
    fn owner_tags_serialize_as_strings() {
        let json = serde_json::to_string(&[OwnerRef::Legacy, OwnerRef::custom("canary")]).unwrap();
        assert_eq!(json, r#"["legacy","canary"]"#);
    }
}
