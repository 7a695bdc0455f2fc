// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Flow rules and the flow table of a switch.

use std::fmt;

use flowsim_topology::{NodeId, PortNo};

/// Priority of the wildcard rule that sends unmatched packets to the
/// controller.
pub const TABLE_MISS_PRIORITY: u16 = 0;

/// Priority of the rules installed along host-to-host paths.
pub const PATH_PRIORITY: u16 = 10;

/// Which packets a rule applies to. `None` matches any host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RuleMatch {
    pub src: Option<NodeId>,
    pub dst: Option<NodeId>,
}

impl RuleMatch {
    #[must_use]
    pub fn wildcard() -> Self {
        Self {
            src: None,
            dst: None,
        }
    }

    #[must_use]
    pub fn pair(src: NodeId, dst: NodeId) -> Self {
        Self {
            src: Some(src),
            dst: Some(dst),
        }
    }

    #[must_use]
    pub fn matches(&self, src: NodeId, dst: NodeId) -> bool {
        self.src.is_none_or(|s| s == src) && self.dst.is_none_or(|d| d == dst)
    }
}

impl fmt::Display for RuleMatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let host = |h: Option<NodeId>| h.map_or("*".to_string(), |h| h.to_string());
        write!(f, "{}->{}", host(self.src), host(self.dst))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleAction {
    /// Forward out of the given port.
    Output(PortNo),
    /// Hand the packet to the controller.
    Controller,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleState {
    Installed,
    Expired,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlowRule {
    pub switch: NodeId,
    pub rule_match: RuleMatch,
    pub action: RuleAction,
    pub priority: u16,
    pub state: RuleState,
}

impl FlowRule {
    #[must_use]
    pub fn new(switch: NodeId, rule_match: RuleMatch, action: RuleAction, priority: u16) -> Self {
        Self {
            switch,
            rule_match,
            action,
            priority,
            state: RuleState::Installed,
        }
    }

    #[must_use]
    pub fn table_miss(switch: NodeId) -> Self {
        Self::new(
            switch,
            RuleMatch::wildcard(),
            RuleAction::Controller,
            TABLE_MISS_PRIORITY,
        )
    }

    #[must_use]
    pub fn is_table_miss(&self) -> bool {
        self.action == RuleAction::Controller
    }

    pub fn expire(&mut self) {
        self.state = RuleState::Expired;
    }
}

impl fmt::Display for FlowRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.action {
            RuleAction::Output(port) => write!(
                f,
                "switch {} prio {} {} => port {}",
                self.switch, self.priority, self.rule_match, port
            ),
            RuleAction::Controller => write!(
                f,
                "switch {} prio {} {} => controller",
                self.switch, self.priority, self.rule_match
            ),
        }
    }
}

/// The rules installed in one switch.
///
/// A lookup returns the matching rule with the highest priority; rules of
/// equal priority are tried in installation order.
#[derive(Clone, Debug, Default)]
pub struct FlowTable {
    rules: Vec<FlowRule>,
}

impl FlowTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a rule, replacing any rule with the same match and priority.
    ///
    /// Returns `true` if the table did not already hold an identical rule.
    pub fn install(&mut self, rule: FlowRule) -> bool {
        match self
            .rules
            .iter_mut()
            .find(|r| r.rule_match == rule.rule_match && r.priority == rule.priority)
        {
            Some(existing) => {
                let changed = existing.action != rule.action;
                *existing = rule;
                changed
            }
            None => {
                self.rules.push(rule);
                true
            }
        }
    }

    /// Remove a rule, returning it marked as expired.
    pub fn remove(&mut self, rule_match: &RuleMatch, priority: u16) -> Option<FlowRule> {
        let index = self
            .rules
            .iter()
            .position(|r| r.rule_match == *rule_match && r.priority == priority)?;
        let mut rule = self.rules.remove(index);
        rule.expire();
        Some(rule)
    }

    #[must_use]
    pub fn lookup(&self, src: NodeId, dst: NodeId) -> Option<&FlowRule> {
        let mut best: Option<&FlowRule> = None;
        for rule in self.rules.iter().filter(|r| r.rule_match.matches(src, dst)) {
            if best.is_none_or(|b| rule.priority > b.priority) {
                best = Some(rule);
            }
        }
        best
    }

    /// Remove every rule, returning them marked as expired.
    pub fn expire_all(&mut self) -> Vec<FlowRule> {
        let mut expired: Vec<FlowRule> = self.rules.drain(..).collect();
        for rule in &mut expired {
            rule.expire();
        }
        expired
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlowRule> {
        self.rules.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
