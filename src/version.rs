//! Version selectors and the constraint they combine into.
//!
//! A [`VersionSelector`] is one half of a dependency declaration ("I want >=1.0", "I want exactly
//! 2.3.1", "give me whatever is newest"). A [`VersionConstraint`] pairs a preferred selector with
//! an optional rejected selector and the `require`/`strictly`/`force` flags from the data model
//! (spec.md §3).

pub use semver::Version;

/// One version selector: either a concrete pin, a range, "latest wins", or a rejection filter.
///
/// `Reject` is only ever used as a constraint's `rejected` half; it is otherwise the same shape
/// as `Range` but read as "versions here are excluded", not "versions here are wanted".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
    Exact(Version),
    Range(String, semver::VersionReq),
    Latest,
    Reject(String, semver::VersionReq),
}

impl VersionSelector {
    pub fn range(req: &str) -> Result<Self, semver::Error> {
        Ok(VersionSelector::Range(req.to_string(), semver::VersionReq::parse(req)?))
    }

    pub fn reject(req: &str) -> Result<Self, semver::Error> {
        Ok(VersionSelector::Reject(req.to_string(), semver::VersionReq::parse(req)?))
    }

    /// Does this selector accept `candidate`?
    pub fn accepts(&self, candidate: &Version) -> bool {
        match self {
            VersionSelector::Exact(v) => v == candidate,
            VersionSelector::Range(_, req) => req.matches(candidate),
            VersionSelector::Latest => true,
            VersionSelector::Reject(_, req) => req.matches(candidate),
        }
    }

    /// Can a new, equivalent selector reuse an already-picked version without a fresh id
    /// resolution? `Exact` cannot: the point of pinning a version is to force that exact
    /// resolution, and resolvers are entitled to special-case it strictly.
    pub fn can_short_circuit_when_version_already_preselected(&self) -> bool {
        match self {
            VersionSelector::Exact(_) => false,
            VersionSelector::Range(..) | VersionSelector::Latest | VersionSelector::Reject(..) => true,
        }
    }

    /// Whether evaluating this selector needs the target's metadata (reserved for selector kinds
    /// that inspect resolved attributes rather than the bare version string; none of the kinds
    /// implemented here do).
    pub fn requires_metadata(&self) -> bool {
        false
    }
}

impl std::fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionSelector::Exact(v) => write!(f, "={v}"),
            VersionSelector::Range(s, _) => write!(f, "{s}"),
            VersionSelector::Latest => write!(f, "+"),
            VersionSelector::Reject(s, _) => write!(f, "!{s}"),
        }
    }
}

/// The constraint a [`SelectorState`](crate::selector::SelectorState) owns: a preferred selector,
/// an optional rejected selector, and the three boolean flags from spec.md §3's data model table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    pub preferred: Option<VersionSelector>,
    pub rejected: Option<VersionSelector>,
    /// This dependency must be present in the graph (as opposed to an optional/constraint-only
    /// declaration that only narrows an existing selection).
    pub require: bool,
    /// Fail resolution rather than let any other selector widen or override this one.
    pub strictly: bool,
    /// Collapse the whole module to this one component; see spec.md §4.2.
    pub force: bool,
}

impl VersionConstraint {
    pub fn prefer(selector: VersionSelector) -> Self {
        Self {
            preferred: Some(selector),
            rejected: None,
            require: true,
            strictly: false,
            force: false,
        }
    }

    pub fn forced(selector: VersionSelector) -> Self {
        Self {
            force: true,
            ..Self::prefer(selector)
        }
    }

    pub fn with_reject(mut self, selector: VersionSelector) -> Self {
        self.rejected = Some(selector);
        self
    }

    /// Agreement check used by `chooseBest` (spec.md §4.3.1 step 2/3): does the preferred
    /// selector accept `version` without needing metadata and without being an exact pin that
    /// can't short-circuit?
    pub fn agrees_with(&self, version: &Version) -> bool {
        match &self.preferred {
            Some(selector) => {
                !selector.requires_metadata()
                    && selector.can_short_circuit_when_version_already_preselected()
                    && selector.accepts(version)
            }
            None => false,
        }
    }

    /// Does the rejected half (if any) accept `version`? Used by `maybeMarkRejected`.
    pub fn rejects(&self, version: &Version) -> bool {
        self.rejected.as_ref().is_some_and(|sel| sel.accepts(version))
    }
}
