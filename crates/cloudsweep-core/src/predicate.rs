//! Predicate evaluation: does one resource fall in scope for deletion?
//!
//! Checks run in a fixed order and stop at the first rejection:
//!
//! ```text
//! allow-list -> deny-list -> state -> name -> age -> size -> tag -> activity
//! ```
//!
//! Steps one to seven are pure and live here ([`Criteria::evaluate`]). The
//! tag step may need a remote lookup and the activity step always does; the
//! service adapters run those last, through [`Criteria::check_tags`] and
//! [`activity_verdict`], so that cheap rejections never pay for a round-trip.

use crate::error::{PolicyError, RemoteError};
use crate::resource::Tags;
use crate::time::Retention;
use chrono::{DateTime, Utc};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies which evaluation step rejected a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    AllowList,
    DenyList,
    /// Resource is provider-managed and never eligible.
    Managed,
    State,
    Name,
    Age,
    Size,
    Tag,
    Activity,
}

/// Why a resource was kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub check: Check,
    pub detail: String,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.check, self.detail)
    }
}

/// Outcome of evaluating one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Target,
    Keep(Rejection),
}

impl Verdict {
    /// Reject at `check`.
    pub fn keep(check: Check, detail: impl Into<String>) -> Self {
        Self::Keep(Rejection {
            check,
            detail: detail.into(),
        })
    }

    /// Returns `true` if the resource is in scope.
    pub fn is_target(&self) -> bool {
        matches!(self, Self::Target)
    }

    /// The check that rejected the resource, if any.
    pub fn rejected_by(&self) -> Option<Check> {
        match self {
            Self::Target => None,
            Self::Keep(r) => Some(r.check),
        }
    }
}

/// A required tag key with an optional exact value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagRequirement {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl TagRequirement {
    /// Reject requirements that could never be satisfied meaningfully.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.key.trim().is_empty() {
            return Err(PolicyError::EmptyTagKey);
        }
        Ok(())
    }

    /// Returns `None` when `tags` satisfy the requirement, else why not.
    pub fn mismatch(&self, tags: &Tags) -> Option<String> {
        match (tags.get(&self.key), &self.value) {
            (None, _) => Some(format!("tag {} missing", self.key)),
            (Some(found), Some(want)) if found != want => {
                Some(format!("tag {} is '{found}', want '{want}'", self.key))
            }
            _ => None,
        }
    }
}

/// Compiled set of name globs. Empty matches everything.
#[derive(Debug, Clone, Default)]
pub struct NameMatcher {
    patterns: Vec<Pattern>,
}

impl NameMatcher {
    /// Compile glob patterns (`*`, `?`, `[...]`).
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, PolicyError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p.as_ref()).map_err(|e| PolicyError::InvalidPattern {
                    pattern: p.as_ref().to_string(),
                    reason: e.msg.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Match names starting with any of `prefixes`, on top of `patterns`.
    ///
    /// Prefixes are literal: glob metacharacters inside them are escaped.
    pub fn with_prefixes<S: AsRef<str>, P: AsRef<str>>(
        patterns: &[S],
        prefixes: &[P],
    ) -> Result<Self, PolicyError> {
        let mut all: Vec<String> = patterns.iter().map(|p| p.as_ref().to_string()).collect();
        all.extend(
            prefixes
                .iter()
                .map(|p| format!("{}*", Pattern::escape(p.as_ref()))),
        );
        Self::new(&all)
    }

    /// Returns `true` if no patterns were configured.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Returns `true` if `name` matches at least one pattern, or none are set.
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(name))
    }
}

/// Tag information available for a resource at evaluation time.
#[derive(Debug, Clone, Copy)]
pub enum TagView<'a> {
    /// Tags came with the listing.
    Known(&'a Tags),
    /// Tags need a separate lookup; the adapter runs the tag step itself.
    Deferred,
}

/// The attributes of one resource the pure checks look at.
#[derive(Debug, Clone, Copy)]
pub struct Subject<'a> {
    /// Identifier matched against allow/deny lists.
    pub id: &'a str,
    /// Display name matched against name globs.
    pub name: &'a str,
    pub state: Option<&'a str>,
    /// Creation or launch time, when the age step applies.
    pub created: Option<DateTime<Utc>>,
    pub size: Option<i64>,
    pub tags: TagView<'a>,
}

impl<'a> Subject<'a> {
    /// A subject identified and matched by the same string.
    pub fn named(id: &'a str) -> Self {
        Self {
            id,
            name: id,
            state: None,
            created: None,
            size: None,
            tags: TagView::Deferred,
        }
    }
}

/// The filters configured for one resource kind.
///
/// Every field is optional: an empty list or `None` skips that step, except
/// `ignore` and `require_tag`, which restrict whenever present.
#[derive(Debug, Clone, Copy)]
pub struct Criteria<'a> {
    pub targets: &'a [String],
    /// Run-level override list (e.g. resolved interactive approvals).
    pub only: Option<&'a [String]>,
    pub ignore: &'a [String],
    pub states: Option<&'a [String]>,
    pub names: Option<&'a NameMatcher>,
    pub retention: Option<Retention>,
    pub min_size: Option<i64>,
    pub require_tag: Option<&'a TagRequirement>,
}

impl<'a> Criteria<'a> {
    /// Criteria that accept everything.
    pub fn open() -> Self {
        Self {
            targets: &[],
            only: None,
            ignore: &[],
            states: None,
            names: None,
            retention: None,
            min_size: None,
            require_tag: None,
        }
    }

    /// Run steps one to seven. A deferred tag view skips step seven.
    pub fn evaluate(&self, subject: &Subject<'_>, now: DateTime<Utc>) -> Verdict {
        let id = subject.id;

        if let Some(only) = self.only.filter(|o| !o.is_empty()) {
            if !only.iter().any(|t| t == id) {
                return Verdict::keep(Check::AllowList, "not in run override list");
            }
        }
        if !self.targets.is_empty() && !self.targets.iter().any(|t| t == id) {
            return Verdict::keep(Check::AllowList, "not in target list");
        }
        if self.ignore.iter().any(|t| t == id) {
            return Verdict::keep(Check::DenyList, "in ignore list");
        }
        if let (Some(states), Some(state)) = (self.states, subject.state) {
            if !states.iter().any(|s| s == state) {
                return Verdict::keep(Check::State, format!("state is {state}"));
            }
        }
        if let Some(names) = self.names {
            if !names.matches(subject.name) {
                return Verdict::keep(Check::Name, "name matches no pattern");
            }
        }
        if let (Some(retention), Some(created)) = (self.retention, subject.created) {
            if retention.protects(created, now) {
                return Verdict::keep(
                    Check::Age,
                    format!("younger than {} day(s)", retention.days()),
                );
            }
        }
        if let (Some(min), Some(size)) = (self.min_size, subject.size) {
            if size < min {
                return Verdict::keep(Check::Size, format!("size {size} below minimum {min}"));
            }
        }
        if let TagView::Known(tags) = subject.tags {
            return self.check_tags(Ok(tags));
        }
        Verdict::Target
    }

    /// Step seven against tags obtained separately. A failed lookup fails
    /// closed: the resource is kept.
    pub fn check_tags(&self, tags: Result<&Tags, &RemoteError>) -> Verdict {
        let Some(required) = self.require_tag else {
            return Verdict::Target;
        };
        match tags {
            Ok(tags) => match required.mismatch(tags) {
                Some(why) => Verdict::keep(Check::Tag, why),
                None => Verdict::Target,
            },
            Err(e) => Verdict::keep(Check::Tag, format!("cannot read tags ({e})")),
        }
    }
}

/// How an activity lookup that produced no timestamp is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unknown {
    /// No known activity: eligible.
    Eligible,
    /// Fall back to comparing this creation time against the window.
    CreatedAt(DateTime<Utc>),
}

/// Step eight: reject when the last activity lies inside the retention window.
pub fn activity_verdict(
    last_activity: Option<DateTime<Utc>>,
    fallback: Unknown,
    retention: Retention,
    now: DateTime<Utc>,
) -> Verdict {
    match (last_activity, fallback) {
        (Some(at), _) if retention.protects(at, now) => {
            Verdict::keep(Check::Activity, format!("active at {}", at.to_rfc3339()))
        }
        (Some(_), _) | (None, Unknown::Eligible) => Verdict::Target,
        (None, Unknown::CreatedAt(created)) if retention.protects(created, now) => Verdict::keep(
            Check::Age,
            format!("no activity and younger than {} day(s)", retention.days()),
        ),
        (None, Unknown::CreatedAt(_)) => Verdict::Target,
    }
}
