//! Persona rules
//!
//! A rule is a persona plus a combinator over threshold conditions. Each
//! condition reads one signal from the snapshot; an undefined signal is either
//! non-applicable or satisfies the condition, depending on its policy.

use serde::{Deserialize, Serialize};

use crate::config::PersonaThresholds;
use crate::models::{MetricSnapshot, Persona, Runway};

/// Snapshot signals a rule can read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    CreditUtilization,
    HasInterest,
    PastDue,
    IncomeVolatility,
    PayGapDays,
    RecurringMerchantCount,
    SubscriptionOutflowRatio,
    IncomePercentile,
    LiquidRunway,
    SavingsRate,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreditUtilization => "credit_utilization",
            Self::HasInterest => "has_interest",
            Self::PastDue => "past_due",
            Self::IncomeVolatility => "income_volatility",
            Self::PayGapDays => "pay_gap_days",
            Self::RecurringMerchantCount => "recurring_merchant_count",
            Self::SubscriptionOutflowRatio => "subscription_outflow_ratio",
            Self::IncomePercentile => "income_percentile",
            Self::LiquidRunway => "liquid_runway",
            Self::SavingsRate => "savings_rate",
        }
    }

    /// Read the measured value from a snapshot
    pub fn read(&self, snapshot: &MetricSnapshot) -> SignalValue {
        let number = |v: Option<f64>| v.map_or(SignalValue::Undefined, SignalValue::Number);
        match self {
            Self::CreditUtilization => number(snapshot.credit_utilization),
            Self::HasInterest => SignalValue::Flag(snapshot.has_interest),
            Self::PastDue => SignalValue::Flag(snapshot.past_due),
            Self::IncomeVolatility => number(snapshot.income_volatility),
            Self::PayGapDays => number(snapshot.pay_gap_days.map(|d| d as f64)),
            Self::RecurringMerchantCount => {
                SignalValue::Number(snapshot.recurring_merchant_count as f64)
            }
            Self::SubscriptionOutflowRatio => number(snapshot.subscription_outflow_ratio),
            Self::IncomePercentile => number(snapshot.income_percentile),
            Self::LiquidRunway => match snapshot.liquid_runway {
                Some(Runway::Months(m)) => SignalValue::Number(m),
                Some(Runway::Unbounded) => SignalValue::Unbounded,
                None => SignalValue::Undefined,
            },
            Self::SavingsRate => number(snapshot.savings_rate),
        }
    }
}

/// A measured signal value as recorded in the decision trace
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SignalValue {
    Number(f64),
    Flag(bool),
    /// Larger than any threshold
    Unbounded,
    Undefined,
}

impl std::fmt::Display for SignalValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{}", v),
            Self::Flag(b) => write!(f, "{}", b),
            Self::Unbounded => write!(f, "unbounded"),
            Self::Undefined => write!(f, "undefined"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    AtLeast,
    GreaterThan,
    LessThan,
    IsTrue,
}

impl Comparator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::AtLeast => ">=",
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::IsTrue => "is",
        }
    }
}

/// What an undefined signal means for a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedPolicy {
    /// The condition cannot be evaluated
    NotApplicable,
    /// The condition holds when the signal is missing
    Satisfied,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub signal: Signal,
    pub comparator: Comparator,
    pub threshold: f64,
    pub when_undefined: UndefinedPolicy,
}

impl Condition {
    pub fn new(signal: Signal, comparator: Comparator, threshold: f64) -> Self {
        Self {
            signal,
            comparator,
            threshold,
            when_undefined: UndefinedPolicy::NotApplicable,
        }
    }

    pub fn flag(signal: Signal) -> Self {
        Self::new(signal, Comparator::IsTrue, 1.0)
    }

    pub fn satisfied_when_undefined(mut self) -> Self {
        self.when_undefined = UndefinedPolicy::Satisfied;
        self
    }

    pub fn evaluate(&self, snapshot: &MetricSnapshot) -> ConditionEvaluation {
        let measured = self.signal.read(snapshot);
        let outcome = match (measured, self.comparator) {
            (SignalValue::Undefined, _) => match self.when_undefined {
                UndefinedPolicy::NotApplicable => ConditionOutcome::NotApplicable,
                UndefinedPolicy::Satisfied => ConditionOutcome::SatisfiedByAbsence,
            },
            (SignalValue::Flag(flag), Comparator::IsTrue) => ConditionOutcome::from_bool(flag),
            (SignalValue::Flag(_), _) => ConditionOutcome::Failed,
            (SignalValue::Unbounded, Comparator::LessThan | Comparator::IsTrue) => {
                ConditionOutcome::Failed
            }
            (SignalValue::Unbounded, _) => ConditionOutcome::Passed,
            (SignalValue::Number(v), comparator) => ConditionOutcome::from_bool(match comparator {
                Comparator::AtLeast => v >= self.threshold,
                Comparator::GreaterThan => v > self.threshold,
                Comparator::LessThan => v < self.threshold,
                Comparator::IsTrue => v != 0.0,
            }),
        };

        ConditionEvaluation {
            signal: self.signal,
            measured,
            comparator: self.comparator,
            threshold: (self.comparator != Comparator::IsTrue).then_some(self.threshold),
            outcome,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOutcome {
    Passed,
    Failed,
    NotApplicable,
    SatisfiedByAbsence,
}

impl ConditionOutcome {
    fn from_bool(passed: bool) -> Self {
        if passed {
            Self::Passed
        } else {
            Self::Failed
        }
    }

    pub fn holds(&self) -> bool {
        matches!(self, Self::Passed | Self::SatisfiedByAbsence)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::NotApplicable => "not_applicable",
            Self::SatisfiedByAbsence => "satisfied_by_absence",
        }
    }
}

/// One condition as recorded in the decision trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionEvaluation {
    pub signal: Signal,
    pub measured: SignalValue,
    pub comparator: Comparator,
    pub threshold: Option<f64>,
    pub outcome: ConditionOutcome,
}

/// How conditions combine into a rule match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    AnyOf,
    AllOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    Matched,
    NotMatched,
    /// Required inputs were undefined
    Skipped,
    /// A higher-priority rule matched first
    NotReached,
}

impl RuleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::NotMatched => "not_matched",
            Self::Skipped => "skipped",
            Self::NotReached => "not_reached",
        }
    }
}

/// One rule as recorded in the decision trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    pub priority: u8,
    pub rule: String,
    pub persona: Persona,
    pub outcome: RuleOutcome,
    pub conditions: Vec<ConditionEvaluation>,
}

/// A persona rule in the classifier's ordered list
pub trait PersonaRule: Send + Sync {
    /// Stable rule name recorded in the trace
    fn name(&self) -> &str;

    fn persona(&self) -> Persona;

    /// Unique slot; lower runs first
    fn priority(&self) -> u8;

    fn evaluate(&self, snapshot: &MetricSnapshot) -> RuleEvaluation;

    fn not_reached(&self) -> RuleEvaluation {
        RuleEvaluation {
            priority: self.priority(),
            rule: self.name().to_string(),
            persona: self.persona(),
            outcome: RuleOutcome::NotReached,
            conditions: Vec::new(),
        }
    }
}

/// A rule built from threshold conditions
#[derive(Debug, Clone)]
pub struct ThresholdRule {
    name: String,
    persona: Persona,
    priority: u8,
    combinator: Combinator,
    conditions: Vec<Condition>,
}

impl ThresholdRule {
    pub fn new(
        name: impl Into<String>,
        persona: Persona,
        priority: u8,
        combinator: Combinator,
        conditions: Vec<Condition>,
    ) -> Self {
        Self {
            name: name.into(),
            persona,
            priority,
            combinator,
            conditions,
        }
    }
}

impl PersonaRule for ThresholdRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn persona(&self) -> Persona {
        self.persona
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn evaluate(&self, snapshot: &MetricSnapshot) -> RuleEvaluation {
        let conditions: Vec<ConditionEvaluation> =
            self.conditions.iter().map(|c| c.evaluate(snapshot)).collect();

        let outcome = match self.combinator {
            Combinator::AnyOf => {
                if conditions.iter().any(|c| c.outcome == ConditionOutcome::Passed) {
                    RuleOutcome::Matched
                } else if conditions
                    .iter()
                    .all(|c| c.outcome == ConditionOutcome::NotApplicable)
                {
                    RuleOutcome::Skipped
                } else {
                    RuleOutcome::NotMatched
                }
            }
            Combinator::AllOf => {
                if conditions
                    .iter()
                    .any(|c| c.outcome == ConditionOutcome::NotApplicable)
                {
                    RuleOutcome::Skipped
                } else if conditions.iter().all(|c| c.outcome.holds()) {
                    RuleOutcome::Matched
                } else {
                    RuleOutcome::NotMatched
                }
            }
        };

        RuleEvaluation {
            priority: self.priority,
            rule: self.name.clone(),
            persona: self.persona,
            outcome,
            conditions,
        }
    }
}

/// The five built-in persona rules, in priority order
pub fn builtin_rules(t: &PersonaThresholds) -> Vec<ThresholdRule> {
    use Comparator::*;
    use Signal::*;

    vec![
        ThresholdRule::new(
            "debt_fighter",
            Persona::DebtFighter,
            1,
            Combinator::AnyOf,
            vec![
                Condition::new(CreditUtilization, AtLeast, t.debt_utilization),
                Condition::flag(HasInterest),
                Condition::flag(PastDue),
            ],
        ),
        ThresholdRule::new(
            "gig_worker",
            Persona::GigWorker,
            2,
            Combinator::AnyOf,
            vec![
                Condition::new(IncomeVolatility, GreaterThan, t.gig_income_volatility),
                Condition::new(PayGapDays, GreaterThan, t.gig_pay_gap_days as f64),
            ],
        ),
        ThresholdRule::new(
            "auto_payer",
            Persona::AutoPayer,
            3,
            Combinator::AllOf,
            vec![
                Condition::new(
                    RecurringMerchantCount,
                    AtLeast,
                    t.auto_payer_min_merchants as f64,
                ),
                Condition::new(
                    SubscriptionOutflowRatio,
                    AtLeast,
                    t.auto_payer_min_subscription_ratio,
                ),
            ],
        ),
        ThresholdRule::new(
            "wealth_compounder",
            Persona::WealthCompounder,
            4,
            Combinator::AllOf,
            vec![
                Condition::new(IncomePercentile, AtLeast, t.wealth_min_income_percentile),
                Condition::new(LiquidRunway, GreaterThan, t.wealth_min_runway_months),
                Condition::new(SavingsRate, LessThan, t.wealth_max_savings_rate),
            ],
        ),
        ThresholdRule::new(
            "optimizer",
            Persona::Optimizer,
            5,
            Combinator::AllOf,
            vec![
                Condition::new(CreditUtilization, LessThan, t.optimizer_max_utilization)
                    .satisfied_when_undefined(),
                Condition::new(SavingsRate, GreaterThan, t.optimizer_min_savings_rate),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn snapshot() -> MetricSnapshot {
        MetricSnapshot::new("U1", NaiveDate::from_ymd_opt(2025, 6, 30).unwrap())
    }

    #[test]
    fn test_condition_boundaries() {
        let mut s = snapshot();
        let condition = Condition::new(Signal::CreditUtilization, Comparator::AtLeast, 0.5);

        s.credit_utilization = Some(0.5);
        assert_eq!(condition.evaluate(&s).outcome, ConditionOutcome::Passed);

        s.credit_utilization = Some(0.499999);
        assert_eq!(condition.evaluate(&s).outcome, ConditionOutcome::Failed);

        s.credit_utilization = None;
        let eval = condition.evaluate(&s);
        assert_eq!(eval.outcome, ConditionOutcome::NotApplicable);
        assert_eq!(eval.measured, SignalValue::Undefined);
    }

    #[test]
    fn test_unbounded_runway() {
        let mut s = snapshot();
        s.liquid_runway = Some(Runway::Unbounded);

        let above = Condition::new(Signal::LiquidRunway, Comparator::GreaterThan, 3.0);
        let below = Condition::new(Signal::LiquidRunway, Comparator::LessThan, 3.0);
        assert_eq!(above.evaluate(&s).outcome, ConditionOutcome::Passed);
        assert_eq!(below.evaluate(&s).outcome, ConditionOutcome::Failed);
    }

    #[test]
    fn test_satisfied_when_undefined() {
        let s = snapshot();
        let condition = Condition::new(Signal::CreditUtilization, Comparator::LessThan, 0.1)
            .satisfied_when_undefined();
        let eval = condition.evaluate(&s);
        assert_eq!(eval.outcome, ConditionOutcome::SatisfiedByAbsence);
        assert!(eval.outcome.holds());
    }

    #[test]
    fn test_flags_record_no_threshold() {
        let mut s = snapshot();
        s.has_interest = true;
        let eval = Condition::flag(Signal::HasInterest).evaluate(&s);
        assert_eq!(eval.outcome, ConditionOutcome::Passed);
        assert_eq!(eval.threshold, None);
    }

    #[test]
    fn test_any_of_skipped_when_nothing_applicable() {
        let rules = builtin_rules(&PersonaThresholds::default());
        let gig = &rules[1];
        assert_eq!(gig.evaluate(&snapshot()).outcome, RuleOutcome::Skipped);

        let mut s = snapshot();
        s.pay_gap_days = Some(21);
        assert_eq!(gig.evaluate(&s).outcome, RuleOutcome::Matched);

        s.pay_gap_days = Some(20);
        assert_eq!(gig.evaluate(&s).outcome, RuleOutcome::NotMatched);
    }

    #[test]
    fn test_all_of_skipped_on_undefined_input() {
        let rules = builtin_rules(&PersonaThresholds::default());
        let auto_payer = &rules[2];

        let mut s = snapshot();
        s.recurring_merchant_count = 5;
        assert_eq!(auto_payer.evaluate(&s).outcome, RuleOutcome::Skipped);

        s.subscription_outflow_ratio = Some(0.09);
        assert_eq!(auto_payer.evaluate(&s).outcome, RuleOutcome::NotMatched);

        s.subscription_outflow_ratio = Some(0.10);
        assert_eq!(auto_payer.evaluate(&s).outcome, RuleOutcome::Matched);
    }

    #[test]
    fn test_builtin_priorities_are_ordered() {
        let rules = builtin_rules(&PersonaThresholds::default());
        let priorities: Vec<u8> = rules.iter().map(|r| r.priority()).collect();
        assert_eq!(priorities, vec![1, 2, 3, 4, 5]);
        assert_eq!(rules[3].persona(), Persona::WealthCompounder);
    }
}
