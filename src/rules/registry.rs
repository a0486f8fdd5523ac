// src/rules/registry.rs

//! Rule and check storage plus best-match selection.
//!
//! Rules are insertion-ordered; the registration ordinal is the tie-break
//! between otherwise equal matches, and targets named by concrete rules take
//! precedence over pattern rules.

use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;

use crate::errors::{Error, Result};
use crate::pattern::{substitute, Pattern};
use crate::rules::handler::{Handler, Probe};

/// A rule's dependency list: fixed at registration, or produced lazily from
/// the concrete target at binding time.
pub enum Depends {
    Static(Vec<String>),
    Dynamic(Box<dyn Fn(&str) -> Vec<String> + Send + Sync>),
}

impl Depends {
    pub fn none() -> Self {
        Depends::Static(Vec::new())
    }

    pub fn from<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Depends::Static(items.into_iter().map(Into::into).collect())
    }

    fn resolve(&self, target: &str) -> Vec<String> {
        match self {
            Depends::Static(items) => items.clone(),
            Depends::Dynamic(f) => f(target),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Produces a file artifact; staleness compares timestamps.
    File,
    /// A named phony action; always stale, no output verification.
    Task { default: bool },
}

/// Immutable after registration.
pub struct Rule {
    targets: Vec<Pattern>,
    static_pattern: Option<Pattern>,
    depends: Depends,
    uses: Vec<String>,
    kind: RuleKind,
    handler: Arc<dyn Handler>,
    description: Option<String>,
    ordinal: usize,
}

impl Rule {
    pub fn kind(&self) -> RuleKind {
        self.kind
    }

    pub fn handler(&self) -> Arc<dyn Handler> {
        Arc::clone(&self.handler)
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The first wildcard-free target, if any.
    fn first_concrete_target(&self) -> Option<&str> {
        self.targets
            .iter()
            .find(|p| !p.is_wildcard())
            .map(|p| p.raw())
    }
}

/// A staleness probe paired with the resource patterns it covers.
///
/// Resource patterns are glob-style; a `%` in a pattern is treated as a
/// match-anything wildcard, same as `*`.
pub struct Check {
    raw: Vec<String>,
    matcher: GlobSet,
    probe: Arc<dyn Probe>,
}

impl Check {
    pub fn probe(&self) -> Arc<dyn Probe> {
        Arc::clone(&self.probe)
    }

    pub fn patterns(&self) -> &[String] {
        &self.raw
    }

    fn matches(&self, name: &str) -> bool {
        self.matcher.is_match(name)
    }
}

/// The outcome of selecting a rule for a target: which rule, the stem its
/// wildcard bound to, and the concrete dependency lists after substitution.
#[derive(Debug, Clone)]
pub struct Selection {
    pub rule: usize,
    pub stem: Option<String>,
    pub depends: Vec<String>,
    pub uses: Vec<String>,
}

/// Insertion-ordered collection of rules and checks plus the default task.
#[derive(Default)]
pub struct Registry {
    rules: Vec<Rule>,
    checks: Vec<Check>,
    default_task: Option<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file rule.
    ///
    /// `pattern` is the static-pattern template for enumerated target lists;
    /// it must contain a wildcard when present.
    pub fn add_rule(
        &mut self,
        targets: &[&str],
        pattern: Option<&str>,
        depends: Depends,
        uses: &[&str],
        handler: Arc<dyn Handler>,
    ) -> Result<()> {
        self.push_rule(targets, pattern, depends, uses, RuleKind::File, handler, None)
    }

    /// Register a task: a file-less, always-stale rule addressed by name.
    pub fn add_task(
        &mut self,
        name: &str,
        default: bool,
        depends: Depends,
        uses: &[&str],
        handler: Arc<dyn Handler>,
        description: Option<&str>,
    ) -> Result<()> {
        let parsed = Pattern::parse(name)?;
        if parsed.is_wildcard() {
            return Err(Error::InvalidPattern {
                pattern: name.to_string(),
                reason: "task names cannot contain a '%' wildcard".to_string(),
            });
        }
        if default {
            if let Some(existing) = &self.default_task {
                return Err(Error::MultipleDefaults(existing.clone(), name.to_string()));
            }
            self.default_task = Some(name.to_string());
        }
        self.push_rule(
            &[name],
            None,
            depends,
            uses,
            RuleKind::Task { default },
            handler,
            description,
        )
    }

    /// Register a staleness probe for virtual resources.
    pub fn add_check(&mut self, resources: &[&str], probe: Arc<dyn Probe>) -> Result<()> {
        if resources.is_empty() {
            return Err(Error::InvalidPattern {
                pattern: String::new(),
                reason: "a check needs at least one resource pattern".to_string(),
            });
        }
        let mut builder = GlobSetBuilder::new();
        for resource in resources {
            let glob_src = resource.replace('%', "*");
            let glob = Glob::new(&glob_src).map_err(|e| Error::InvalidPattern {
                pattern: resource.to_string(),
                reason: e.to_string(),
            })?;
            builder.add(glob);
        }
        let matcher = builder.build().map_err(|e| Error::InvalidPattern {
            pattern: resources.join(", "),
            reason: e.to_string(),
        })?;
        self.checks.push(Check {
            raw: resources.iter().map(|s| s.to_string()).collect(),
            matcher,
            probe,
        });
        Ok(())
    }

    fn push_rule(
        &mut self,
        targets: &[&str],
        pattern: Option<&str>,
        depends: Depends,
        uses: &[&str],
        kind: RuleKind,
        handler: Arc<dyn Handler>,
        description: Option<&str>,
    ) -> Result<()> {
        if targets.is_empty() {
            return Err(Error::InvalidPattern {
                pattern: String::new(),
                reason: "a rule needs at least one target".to_string(),
            });
        }
        let targets = targets
            .iter()
            .map(|t| Pattern::parse(t))
            .collect::<Result<Vec<_>>>()?;
        let static_pattern = match pattern {
            Some(p) => {
                let parsed = Pattern::parse(p)?;
                if !parsed.is_wildcard() {
                    return Err(Error::InvalidPattern {
                        pattern: p.to_string(),
                        reason: "a static-pattern template must contain a '%'".to_string(),
                    });
                }
                Some(parsed)
            }
            None => None,
        };
        // Dependency templates get the same one-wildcard validation as
        // targets; dynamic lists are validated when they are produced.
        if let Depends::Static(items) = &depends {
            for item in items {
                Pattern::parse(item)?;
            }
        }
        for item in uses {
            Pattern::parse(item)?;
        }

        let ordinal = self.rules.len();
        self.rules.push(Rule {
            targets,
            static_pattern,
            depends,
            uses: uses.iter().map(|s| s.to_string()).collect(),
            kind,
            handler,
            description: description.map(|s| s.to_string()),
            ordinal,
        });
        Ok(())
    }

    pub fn rule(&self, ordinal: usize) -> &Rule {
        &self.rules[ordinal]
    }

    /// Tasks in registration order, with default flag and description.
    pub fn tasks(&self) -> impl Iterator<Item = (&str, bool, Option<&str>)> {
        self.rules.iter().filter_map(|rule| match rule.kind {
            RuleKind::Task { default } => Some((
                rule.targets[0].raw(),
                default,
                rule.description.as_deref(),
            )),
            RuleKind::File => None,
        })
    }

    /// The target built when none is requested: the default task, or the
    /// first concrete target of any rule.
    pub fn default_target(&self) -> Option<String> {
        if let Some(task) = &self.default_task {
            return Some(task.clone());
        }
        self.rules
            .iter()
            .find_map(|r| r.first_concrete_target())
            .map(|s| s.to_string())
    }

    /// The earliest-registered check whose resource patterns match `name`.
    pub fn matching_check(&self, name: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.matches(name))
    }

    /// Select the best rule for `target` and bind its dependency lists.
    ///
    /// Match order: concrete enumerated target, then static-pattern, then
    /// pattern-only (longest literal prefix wins, then registration order).
    /// Returns `None` when no rule matches; the caller decides whether the
    /// target is a source file, a virtual resource, or an error.
    pub fn select(&self, target: &str) -> Result<Option<Selection>> {
        // Concrete and static-pattern matches share the "target is named
        // literally" test; the template only adds a stem when it binds.
        for rule in &self.rules {
            if rule.targets.iter().any(|p| p.matches_exact(target)) {
                let stem = rule
                    .static_pattern
                    .as_ref()
                    .and_then(|p| p.bind(target))
                    .map(|s| s.to_string());
                return Ok(Some(self.bind(rule, target, stem)?));
            }
        }

        let mut best: Option<(usize, usize, String)> = None;
        for rule in &self.rules {
            for pat in rule.targets.iter().filter(|p| p.is_wildcard()) {
                if let Some(stem) = pat.bind(target) {
                    let key = (pat.literal_prefix_len(), rule.ordinal);
                    let better = match &best {
                        Some((len, ord, _)) => key.0 > *len || (key.0 == *len && key.1 < *ord),
                        None => true,
                    };
                    if better {
                        best = Some((key.0, key.1, stem.to_string()));
                    }
                }
            }
        }

        match best {
            Some((_, ordinal, stem)) => {
                let rule = &self.rules[ordinal];
                Ok(Some(self.bind(rule, target, Some(stem))?))
            }
            None => Ok(None),
        }
    }

    fn bind(&self, rule: &Rule, target: &str, stem: Option<String>) -> Result<Selection> {
        let raw_depends = rule.depends.resolve(target);
        let depends = bind_names(&raw_depends, stem.as_deref())?;
        let uses = bind_names(&rule.uses, stem.as_deref())?;
        debug!(
            target = %target,
            rule = rule.ordinal,
            ?stem,
            ?depends,
            ?uses,
            "bound rule for target"
        );
        Ok(Selection {
            rule: rule.ordinal,
            stem,
            depends,
            uses,
        })
    }
}

/// Substitute the stem into each dependency template, preserving order and
/// dropping duplicates. Without a stem the templates are taken literally.
fn bind_names(templates: &[String], stem: Option<&str>) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(templates.len());
    for template in templates {
        let bound = match stem {
            Some(s) => substitute(template, s)?,
            None => template.clone(),
        };
        if !out.contains(&bound) {
            out.push(bound);
        }
    }
    Ok(out)
}
