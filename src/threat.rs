//! Per-source risk classification.
//!
//! The monitor is advisory. It answers "how risky is this address" from a
//! block-list and a set of rules; acting on the answer is up to the caller,
//! or to an [`Enforcement`] hook that receives every block decision.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};

use crate::addr::{Address, Cidr};

/// Default number of audit records kept.
pub const DEFAULT_AUDIT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
            ThreatLevel::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// One audit log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreatRecord {
    pub source: Address,
    pub level: ThreatLevel,
    pub timestamp: SystemTime,
    pub description: String,
}

impl ThreatRecord {
    pub fn new(source: Address, level: ThreatLevel, description: impl Into<String>) -> Self {
        ThreatRecord {
            source,
            level,
            timestamp: SystemTime::now(),
            description: description.into(),
        }
    }
}

/// What a rule matches on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulePattern {
    /// One address.
    Exact(Address),
    /// Every address in the range, same family only.
    Range(Cidr),
    /// Substring of the formatted address.
    Contains(String),
}

impl RulePattern {
    pub fn matches(&self, address: &Address) -> bool {
        match self {
            RulePattern::Exact(a) => a == address,
            RulePattern::Range(cidr) => cidr.contains(address),
            RulePattern::Contains(needle) => address.to_string().contains(needle.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreatRule {
    pub pattern: RulePattern,
    pub level: ThreatLevel,
    pub description: String,
}

impl ThreatRule {
    pub fn new(pattern: RulePattern, level: ThreatLevel, description: impl Into<String>) -> Self {
        ThreatRule {
            pattern,
            level,
            description: description.into(),
        }
    }
}

/// Receives block decisions, e.g. to program a firewall.
pub trait Enforcement: Send + Sync {
    fn block(&self, address: &Address, level: ThreatLevel);

    fn unblock(&self, _address: &Address) {}
}

/// Initial state of a [`ThreatMonitor`].
#[derive(Debug, Clone)]
pub struct ThreatConfig {
    /// Addresses blocked from the start, at `High`.
    pub blocklist: Vec<Address>,
    pub rules: Vec<ThreatRule>,
    /// Audit records kept before the oldest are dropped.
    pub audit_capacity: usize,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        ThreatConfig {
            blocklist: Vec::new(),
            rules: vec![ThreatRule::new(
                RulePattern::Contains("255.255.255".into()),
                ThreatLevel::Medium,
                "broadcast-like address",
            )],
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
        }
    }
}

/// Shared, thread safe threat state for one listener.
pub struct ThreatMonitor {
    blocklist: RwLock<HashMap<Address, ThreatLevel>>,
    rules: RwLock<Vec<ThreatRule>>,
    audit: Mutex<VecDeque<ThreatRecord>>,
    audit_capacity: usize,
    enforcement: Option<Arc<dyn Enforcement>>,
}

impl ThreatMonitor {
    pub fn new(config: ThreatConfig) -> ThreatMonitor {
        let blocklist = config
            .blocklist
            .into_iter()
            .map(|a| (a, ThreatLevel::High))
            .collect();
        ThreatMonitor {
            blocklist: RwLock::new(blocklist),
            rules: RwLock::new(config.rules),
            audit: Mutex::new(VecDeque::new()),
            audit_capacity: config.audit_capacity.max(1),
            enforcement: None,
        }
    }

    pub fn with_enforcement(mut self, enforcement: Arc<dyn Enforcement>) -> ThreatMonitor {
        self.enforcement = Some(enforcement);
        self
    }

    /// Highest level among the block-list entry and every matching rule.
    /// `Low` when nothing matches.
    pub fn classify(&self, address: &Address) -> ThreatLevel {
        let blocked = self.blocklist.read().get(address).copied();
        let ruled = self
            .rules
            .read()
            .iter()
            .filter(|r| r.pattern.matches(address))
            .map(|r| r.level)
            .max();

        blocked
            .into_iter()
            .chain(ruled)
            .max()
            .unwrap_or(ThreatLevel::Low)
    }

    /// Block `address` at `level`. Returns true when the entry is new or its
    /// level went up; a lower or equal level changes nothing.
    pub fn block(&self, address: Address, level: ThreatLevel) -> bool {
        let changed = {
            let mut blocklist = self.blocklist.write();
            match blocklist.get(&address) {
                Some(existing) if *existing >= level => false,
                _ => {
                    blocklist.insert(address, level);
                    true
                }
            }
        };

        if changed {
            self.log_event(ThreatRecord::new(address, level, "blocked"));
            if let Some(e) = &self.enforcement {
                e.block(&address, level);
            }
        }
        changed
    }

    /// Returns true when the address was blocked.
    pub fn unblock(&self, address: &Address) -> bool {
        let removed = self.blocklist.write().remove(address).is_some();
        if removed {
            debug!("Unblocked {}", address);
            if let Some(e) = &self.enforcement {
                e.unblock(address);
            }
        }
        removed
    }

    pub fn is_blocked(&self, address: &Address) -> bool {
        self.blocklist.read().contains_key(address)
    }

    pub fn add_rule(&self, rule: ThreatRule) {
        self.rules.write().push(rule);
    }

    /// Append to the audit log, dropping the oldest record when full.
    pub fn log_event(&self, record: ThreatRecord) {
        warn!(
            "Threat {} from {}: {}",
            record.level, record.source, record.description
        );
        let mut audit = self.audit.lock();
        if audit.len() >= self.audit_capacity {
            audit.pop_front();
        }
        audit.push_back(record);
    }

    /// Snapshot of the audit log, oldest first.
    pub fn records(&self) -> Vec<ThreatRecord> {
        self.audit.lock().iter().cloned().collect()
    }
}

impl Default for ThreatMonitor {
    fn default() -> Self {
        ThreatMonitor::new(ThreatConfig::default())
    }
}

impl fmt::Debug for ThreatMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreatMonitor")
            .field("blocked", &self.blocklist.read().len())
            .field("rules", &self.rules.read().len())
            .field("records", &self.audit.lock().len())
            .finish()
    }
}
