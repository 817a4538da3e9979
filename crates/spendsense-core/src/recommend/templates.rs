//! Built-in recommendation templates
//!
//! Each template reads only the snapshot and returns `None` when the signals
//! it needs are undefined or the suggestion does not apply.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use super::format::{money, months, ordinal, percent, plural};
use super::types::Draft;
use super::RecommendationTemplate;
use crate::models::{MetricSnapshot, Persona, Runway};

/// Utilization the paydown template aims for
const TARGET_UTILIZATION: Decimal = Decimal::from_parts(30, 0, 0, false, 2);
/// Savings rate the savings-automation template aims for
const TARGET_SAVINGS_RATE: Decimal = Decimal::from_parts(10, 0, 0, false, 2);
/// Months of spending in a starter buffer
const BUFFER_MONTHS: u32 = 3;

fn window(snapshot: &MetricSnapshot) -> Decimal {
    Decimal::from(snapshot.window_months.max(1))
}

fn draft(headline: impl Into<String>, rationale: String, action: &str) -> Option<Draft> {
    Some(Draft {
        headline: headline.into(),
        rationale,
        action: action.to_string(),
    })
}

/// Amount to pay down to reach the target utilization
pub struct CreditPaydown;

impl RecommendationTemplate for CreditPaydown {
    fn key(&self) -> &'static str {
        "credit_paydown"
    }

    fn personas(&self) -> &'static [Persona] {
        &[Persona::DebtFighter]
    }

    fn render(&self, s: &MetricSnapshot) -> Option<Draft> {
        let balance = s.credit_balance?;
        let limit = s.credit_limit?;
        let utilization = s.credit_utilization?;
        let paydown = balance - limit * TARGET_UTILIZATION;
        if paydown <= Decimal::ZERO {
            return None;
        }

        draft(
            "Bring card utilization under 30%",
            format!(
                "Because your cards carry {} against {} of limits ({} utilization), paying down {} would bring utilization to 30%.",
                money(balance),
                money(limit),
                percent(utilization),
                money(paydown)
            ),
            "guide/credit-utilization",
        )
    }
}

/// Interest paid over the window and its annualized pace
pub struct InterestCost;

impl RecommendationTemplate for InterestCost {
    fn key(&self) -> &'static str {
        "interest_cost"
    }

    fn personas(&self) -> &'static [Persona] {
        &[Persona::DebtFighter]
    }

    fn render(&self, s: &MetricSnapshot) -> Option<Draft> {
        if !s.has_interest {
            return None;
        }
        let annualized = s.interest_charges * Decimal::from(12) / window(s);

        draft(
            "Reduce what you pay in card interest",
            format!(
                "Because you paid {} in interest over the last {} months, about {} a year at this pace, paying more than the minimum or moving the balance to a lower rate would cut that cost.",
                money(s.interest_charges),
                s.window_months,
                money(annualized)
            ),
            "guide/interest-costs",
        )
    }
}

pub struct PastDue;

impl RecommendationTemplate for PastDue {
    fn key(&self) -> &'static str {
        "past_due"
    }

    fn personas(&self) -> &'static [Persona] {
        &[Persona::DebtFighter]
    }

    fn render(&self, s: &MetricSnapshot) -> Option<Draft> {
        if s.past_due_accounts == 0 {
            return None;
        }

        draft(
            "Bring past-due accounts current",
            format!(
                "Because {} {} past due, a payment now can stop late fees and protect your credit history.",
                s.past_due_accounts,
                plural(s.past_due_accounts, "account is", "accounts are")
            ),
            "tool/payment-reminders",
        )
    }
}

/// Buffer sized to a few months of spending for uneven income
pub struct IncomeBuffer;

impl RecommendationTemplate for IncomeBuffer {
    fn key(&self) -> &'static str {
        "income_buffer"
    }

    fn personas(&self) -> &'static [Persona] {
        &[Persona::GigWorker]
    }

    fn render(&self, s: &MetricSnapshot) -> Option<Draft> {
        let burn = s.burn_rate?;
        let pattern = match (s.income_volatility, s.pay_gap_days) {
            (Some(volatility), Some(gap)) => format!(
                "your income varied by {} over the last {} months with up to {} days between payments",
                percent(volatility),
                s.income_window_months,
                gap
            ),
            (Some(volatility), None) => format!(
                "your income varied by {} over the last {} months",
                percent(volatility),
                s.income_window_months
            ),
            (None, Some(gap)) => format!("you went up to {} days between payments", gap),
            (None, None) => return None,
        };

        let target = burn * Decimal::from(BUFFER_MONTHS);
        let shortfall = target - s.liquid_balance;
        let surplus = s.monthly_surplus();
        let progress = if shortfall <= Decimal::ZERO {
            format!(" You already hold {}, so keep it set aside.", money(s.liquid_balance))
        } else if surplus > Decimal::ZERO {
            let to_goal = (shortfall / surplus).to_f64().unwrap_or_default();
            format!(
                " At your current surplus of {} a month you would reach it in about {} months.",
                money(surplus),
                months(to_goal)
            )
        } else {
            String::new()
        };

        draft(
            "Build a buffer for uneven paychecks",
            format!(
                "Because {}, a buffer of {} ({} months of spending) would cover the lean stretches.{}",
                pattern,
                money(target),
                BUFFER_MONTHS,
                progress
            ),
            "tool/income-smoothing",
        )
    }
}

/// Recurring charges as a share of spending and their yearly cost
pub struct RecurringAudit;

impl RecommendationTemplate for RecurringAudit {
    fn key(&self) -> &'static str {
        "recurring_audit"
    }

    fn personas(&self) -> &'static [Persona] {
        &[Persona::AutoPayer]
    }

    fn render(&self, s: &MetricSnapshot) -> Option<Draft> {
        let ratio = s.subscription_outflow_ratio?;
        if s.recurring_merchant_count == 0 {
            return None;
        }
        let annual = s.subscription_outflow * Decimal::from(12) / window(s);

        draft(
            "Review your recurring charges",
            format!(
                "Because {} {} you on a regular schedule, taking {} of your spending, recurring charges are on track to cost {} over a year.",
                s.recurring_merchant_count,
                plural(s.recurring_merchant_count, "merchant bills", "merchants bill"),
                percent(ratio),
                money(annual)
            ),
            "tool/subscription-audit",
        )
    }
}

/// The single most expensive recurring merchant
pub struct LargestRecurring;

impl RecommendationTemplate for LargestRecurring {
    fn key(&self) -> &'static str {
        "largest_recurring"
    }

    fn personas(&self) -> &'static [Persona] {
        &[Persona::AutoPayer]
    }

    fn render(&self, s: &MetricSnapshot) -> Option<Draft> {
        // Ties go to the alphabetically first merchant
        let top = s
            .recurring_merchants
            .iter()
            .max_by(|a, b| {
                a.total_outflow
                    .cmp(&b.total_outflow)
                    .then_with(|| b.merchant.cmp(&a.merchant))
            })?;

        draft(
            format!("Check whether {} is still worth it", top.merchant),
            format!(
                "Because {} charged you {} times for {} in the last {} months, it is your largest recurring charge.",
                top.merchant,
                top.occurrences,
                money(top.total_outflow),
                s.window_months
            ),
            "tool/subscription-audit",
        )
    }
}

/// Cash above the burn-multiple cushion
pub struct IdleCash;

impl RecommendationTemplate for IdleCash {
    fn key(&self) -> &'static str {
        "idle_cash"
    }

    fn personas(&self) -> &'static [Persona] {
        &[Persona::WealthCompounder, Persona::Optimizer, Persona::Unclassified]
    }

    fn render(&self, s: &MetricSnapshot) -> Option<Draft> {
        let idle = s.inefficiency_score?;
        let burn = s.burn_rate?;
        let floor = s.idle_cash_floor?;
        let runway = s.liquid_runway?;
        if idle <= Decimal::ZERO {
            return None;
        }

        let coverage = match runway {
            Runway::Months(m) => format!("{} months of spending at {} a month", months(m), money(burn)),
            Runway::Unbounded => "more than your spending needs".to_string(),
        };

        draft(
            "Put idle cash to work",
            format!(
                "Because you hold {} in checking and savings, {}, about {} sits above a {} cushion and could earn more in a high-yield account.",
                money(s.liquid_balance),
                coverage,
                money(idle),
                money(floor)
            ),
            "guide/high-yield-savings",
        )
    }
}

/// Monthly transfer that lifts the savings rate to the target
pub struct SavingsAutomation;

impl RecommendationTemplate for SavingsAutomation {
    fn key(&self) -> &'static str {
        "savings_automation"
    }

    fn personas(&self) -> &'static [Persona] {
        &[Persona::WealthCompounder]
    }

    fn render(&self, s: &MetricSnapshot) -> Option<Draft> {
        let rate = s.savings_rate?;
        let percentile = s.income_percentile?;
        let saved = s.total_income - s.total_outflow;
        let gap = s.total_income * TARGET_SAVINGS_RATE - saved;
        if gap <= Decimal::ZERO {
            return None;
        }
        let monthly = gap / window(s);
        let rank = Decimal::from_f64(percentile * 100.0)
            .and_then(|p| p.round().to_u32())
            .unwrap_or_default();

        draft(
            "Automate a monthly transfer to savings",
            format!(
                "Because your income is in the {} percentile of customers but you save {} of it, moving {} a month automatically would lift your savings rate to 10%.",
                ordinal(rank),
                percent(rate),
                money(monthly)
            ),
            "tool/automatic-savings",
        )
    }
}

pub struct Momentum;

impl RecommendationTemplate for Momentum {
    fn key(&self) -> &'static str {
        "momentum"
    }

    fn personas(&self) -> &'static [Persona] {
        &[Persona::Optimizer]
    }

    fn render(&self, s: &MetricSnapshot) -> Option<Draft> {
        let rate = s.savings_rate?;
        let credit = match s.credit_utilization {
            Some(utilization) => format!("with cards at {} utilization", percent(utilization)),
            None => "with no card balances".to_string(),
        };

        draft(
            "Keep your momentum going",
            format!(
                "Because you save {} of your income, a surplus of {} a month {}, you are well placed to set a longer-term goal.",
                percent(rate),
                money(s.monthly_surplus()),
                credit
            ),
            "tool/goal-planner",
        )
    }
}

/// Starter emergency fund of a few months of spending
pub struct EmergencyFund;

impl RecommendationTemplate for EmergencyFund {
    fn key(&self) -> &'static str {
        "emergency_fund"
    }

    fn personas(&self) -> &'static [Persona] {
        &[Persona::Unclassified]
    }

    fn render(&self, s: &MetricSnapshot) -> Option<Draft> {
        let burn = s.burn_rate?;
        if burn <= Decimal::ZERO {
            return None;
        }
        let target = burn * Decimal::from(BUFFER_MONTHS);
        if s.liquid_balance >= target {
            return None;
        }

        draft(
            "Start an emergency fund",
            format!(
                "Because you spend about {} a month and hold {} in cash, a starter fund of {} ({} months of spending) would cover surprises.",
                money(burn),
                money(s.liquid_balance),
                money(target),
                BUFFER_MONTHS
            ),
            "guide/emergency-fund",
        )
    }
}

/// Prompt to link accounts when there is no usable history
pub struct DataCoverage;

impl RecommendationTemplate for DataCoverage {
    fn key(&self) -> &'static str {
        "data_coverage"
    }

    fn personas(&self) -> &'static [Persona] {
        &[Persona::Unclassified]
    }

    fn render(&self, s: &MetricSnapshot) -> Option<Draft> {
        if s.burn_rate.is_some() {
            return None;
        }

        draft(
            "Link your everyday accounts",
            format!(
                "Because we found {} transactions in the last {} months, we cannot estimate your spending yet. Linking the accounts you use day to day would let us tailor these tips.",
                s.transaction_count,
                s.window_months
            ),
            "tool/link-accounts",
        )
    }
}

/// Built-in templates in output order
pub fn builtin_templates() -> Vec<Box<dyn RecommendationTemplate>> {
    vec![
        Box::new(CreditPaydown),
        Box::new(InterestCost),
        Box::new(PastDue),
        Box::new(IncomeBuffer),
        Box::new(RecurringAudit),
        Box::new(LargestRecurring),
        Box::new(Momentum),
        Box::new(IdleCash),
        Box::new(SavingsAutomation),
        Box::new(EmergencyFund),
        Box::new(DataCoverage),
    ]
}
