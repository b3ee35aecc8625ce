use std::fmt;

// ── Tables and chains ───────────────────────────────────────────────

/// An ip6tables table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Filter,
    Nat,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Filter => "filter",
            Self::Nat => "nat",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ip6tables chain, builtin or Docker-owned.
///
/// Only the split isolation chains exist; the flat `DOCKER-ISOLATION`
/// chain of pre-17.06 daemons is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chain {
    Input,
    Output,
    Prerouting,
    Postrouting,
    Forward,
    DockerUser,
    Docker,
    DockerIsolationStage1,
    DockerIsolationStage2,
}

impl Chain {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "INPUT",
            Self::Output => "OUTPUT",
            Self::Prerouting => "PREROUTING",
            Self::Postrouting => "POSTROUTING",
            Self::Forward => "FORWARD",
            Self::DockerUser => "DOCKER-USER",
            Self::Docker => "DOCKER",
            Self::DockerIsolationStage1 => "DOCKER-ISOLATION-STAGE-1",
            Self::DockerIsolationStage2 => "DOCKER-ISOLATION-STAGE-2",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (table, chain) pair, used as the key of per-chain bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableChain {
    pub table: Table,
    pub chain: Chain,
}

impl TableChain {
    pub fn new(table: Table, chain: Chain) -> Self {
        Self { table, chain }
    }
}

// ── Rules ───────────────────────────────────────────────────────────

/// A single firewall rule.
///
/// `spec` is the ordered ip6tables argument list after `-t <table>`.
/// Two rules are equal iff table, chain, prepend flag and every spec
/// token match; no canonicalization is performed, because the kernel
/// `-C` probe is equally token-exact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub tc: TableChain,
    pub spec: Vec<String>,
    pub prepend: bool,
}

impl Rule {
    /// An appended rule: lands after the rules this process already owns
    /// in its chain.
    pub fn new<I, S>(table: Table, chain: Chain, spec: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tc: TableChain::new(table, chain),
            spec: spec.into_iter().map(Into::into).collect(),
            prepend: false,
        }
    }

    /// A prepended rule: must occupy the top of its chain.
    pub fn prepended<I, S>(table: Table, chain: Chain, spec: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prepend: true,
            ..Self::new(table, chain, spec)
        }
    }

    /// Spec tokens joined with `#`, which cannot appear inside a token.
    /// Keys the per-chain active-rule index.
    pub fn hash(&self) -> String {
        self.spec.join("#")
    }

    /// Same table, chain and spec, regardless of the prepend flag.
    ///
    /// Used to recognize the FORWARD → DOCKER-USER jump, which is
    /// emitted prepended but tracked as a plain sentinel.
    pub fn same_rule(&self, other: &Rule) -> bool {
        self.tc == other.tc && self.spec == other.spec
    }
}

// ── Rulesets ────────────────────────────────────────────────────────

/// An ordered collection of rules.
///
/// Order is significant: it is the order rules are applied in, and the
/// order they end up in within their chains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ruleset(Vec<Rule>);

impl Ruleset {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    pub fn push(&mut self, rule: Rule) {
        self.0.push(rule);
    }

    pub fn contains(&self, rule: &Rule) -> bool {
        self.0.contains(rule)
    }

    /// Rules in `self` that are not in `other`, preserving `self` order.
    pub fn diff(&self, other: &Ruleset) -> Ruleset {
        if other.is_empty() {
            return self.clone();
        }

        self.0
            .iter()
            .filter(|r| !other.contains(r))
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Rule> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Rule> for Ruleset {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<Rule>> for Ruleset {
    fn from(rules: Vec<Rule>) -> Self {
        Self(rules)
    }
}

impl Extend<Rule> for Ruleset {
    fn extend<I: IntoIterator<Item = Rule>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for Ruleset {
    type Item = Rule;
    type IntoIter = std::vec::IntoIter<Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Ruleset {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
