use crate::credits::{credit_coverage, runway_outlook};
use crate::error::{AppError, QueryFailure};
use crate::models::{
    AggregatedCosts, BillingReport, CreditAnalysis, CreditState, CreditStatus, DiagnosticReport,
    Projection, RunwayOutlook,
};
use crate::notify::{Alert, AlertColor};
use crate::suggestions::suggestions_for;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

const RULE_WIDTH: usize = 70;
const SECTION_WIDTH: usize = 40;
const BAR_WIDTH: usize = 50;
const TOP_USAGE_TYPES: usize = 10;
const TOP_SERVICES_IN_CHAT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    pub console: String,
    pub chat: String,
}

// Half-up rounding; a value that rounds to zero prints without a sign.
pub fn fixed(value: Decimal, places: u32) -> String {
    let rounded = value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
    let rounded = if rounded.is_zero() { Decimal::ZERO } else { rounded };
    format!("{rounded:.prec$}", prec = places as usize)
}

pub fn money(currency: &str, amount: Decimal) -> String {
    format!("{currency} {}", fixed(amount, 2))
}

pub fn percent_of(part: Decimal, total: Decimal) -> Decimal {
    if total.abs() < Decimal::new(1, 2) {
        return Decimal::ZERO;
    }
    part.checked_div(total)
        .and_then(|share| share.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}

pub fn progress_bar(percent: Decimal, width: usize) -> String {
    let filled = (percent.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED) * Decimal::from(width)
        / Decimal::ONE_HUNDRED)
        .floor()
        .to_usize()
        .unwrap_or(0)
        .min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

fn rule(lines: &mut Vec<String>) {
    lines.push("=".repeat(RULE_WIDTH));
}

fn section(lines: &mut Vec<String>, title: &str) {
    lines.push(String::new());
    lines.push(title.to_string());
    lines.push("-".repeat(SECTION_WIDTH));
}

fn ranked(lines: &mut Vec<String>, costs: &AggregatedCosts, currency: &str, limit: usize) {
    if costs.is_empty() {
        lines.push("  (no costs above threshold)".into());
        return;
    }
    let total = costs.total();
    for (i, entry) in costs.sorted_desc().into_iter().take(limit).enumerate() {
        lines.push(format!(
            "  {}. {}: {} ({}%)",
            i + 1,
            entry.key,
            money(currency, entry.amount),
            fixed(percent_of(entry.amount, total), 1)
        ));
    }
}

fn credit_lines(lines: &mut Vec<String>, state: &CreditState, status: CreditStatus, currency: &str) {
    let used = state.percent_used();
    lines.push(format!("Total Credits:     {}", money(currency, state.total_available)));
    lines.push(format!(
        "Credits Used:      {} ({}%)",
        money(currency, state.used_lifetime),
        fixed(used, 1)
    ));
    lines.push(format!("Credits Remaining: {}", money(currency, state.remaining)));
    lines.push(format!(
        "Progress:          [{}] {}%",
        progress_bar(used, BAR_WIDTH),
        fixed(used, 1)
    ));
    lines.push(format!("Status:            {status}"));
}

pub fn outlook_message(outlook: RunwayOutlook) -> &'static str {
    match outlook {
        RunwayOutlook::Warning => "WARNING: Credits will be exhausted within 1 month!",
        RunwayOutlook::Caution => "CAUTION: Credits will be exhausted within 3 months",
        RunwayOutlook::Info => "INFO: Credits will be exhausted within 6 months",
        RunwayOutlook::Good => "GOOD: Credits should last more than 6 months",
    }
}

fn projection_lines(
    lines: &mut Vec<String>,
    projection: &Projection,
    monthly_burn_rate: Decimal,
    currency: &str,
) {
    lines.push(format!("Monthly Burn Rate: {}", money(currency, monthly_burn_rate)));
    lines.push(format!(
        "Months Remaining:  {}",
        fixed(projection.months_remaining, 1)
    ));
    lines.push(format!("Est. Exhaustion:   {}", projection.exhaustion_date));
    lines.push(outlook_message(runway_outlook(projection.months_remaining)).to_string());
}

fn degraded_lines(lines: &mut Vec<String>, degraded: &[QueryFailure]) {
    if degraded.is_empty() {
        return;
    }
    section(lines, "INCOMPLETE DATA");
    for failure in degraded {
        lines.push(format!("  ! {}: {}", failure.query, failure.cause));
    }
}

pub fn render(report: &BillingReport) -> RenderedReport {
    RenderedReport {
        console: render_console(report),
        chat: render_chat(report),
    }
}

fn render_console(report: &BillingReport) -> String {
    let currency = report.currency.as_str();
    let mut lines = Vec::new();

    rule(&mut lines);
    lines.push("BILLING REPORT".into());
    rule(&mut lines);
    lines.push(format!("Period:    {}", report.period.describe()));
    lines.push(format!(
        "Generated: {}",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    section(&mut lines, "COSTS");
    lines.push(format!("Total Cost:        {}", money(currency, report.total_cost)));
    lines.push(format!("Usage Cost:        {}", money(currency, report.usage_cost)));
    lines.push(format!(
        "Credits Applied:   {}",
        money(currency, report.credits_applied.abs())
    ));
    lines.push(format!(
        "Net Cost:          {}",
        money(currency, report.net_cost.max(Decimal::ZERO))
    ));
    if let Some(coverage) = credit_coverage(report.usage_cost, report.credits_applied) {
        lines.push(format!("Credit Coverage:   {}%", fixed(coverage, 1)));
    }

    section(&mut lines, "CREDITS");
    credit_lines(&mut lines, &report.credit_state, report.status, currency);

    if let Some(projection) = &report.projection {
        section(&mut lines, "PROJECTION");
        projection_lines(&mut lines, projection, report.monthly_burn_rate, currency);
    }

    section(&mut lines, "COSTS BY SERVICE");
    ranked(&mut lines, &report.by_service, currency, usize::MAX);

    section(&mut lines, "TOP USAGE TYPES");
    ranked(&mut lines, &report.by_usage_type, currency, TOP_USAGE_TYPES);

    section(&mut lines, "DAILY COSTS");
    if report.by_day.is_empty() {
        lines.push("  (no costs above threshold)".into());
    } else {
        for entry in report.by_day.sorted_by_key() {
            lines.push(format!("  {}: {}", entry.key, money(currency, entry.amount)));
        }
    }

    degraded_lines(&mut lines, &report.degraded);

    lines.push(String::new());
    rule(&mut lines);
    lines.join("\n")
}

fn render_chat(report: &BillingReport) -> String {
    let currency = report.currency.as_str();
    let state = &report.credit_state;
    let mut lines = vec![
        format!("*Billing report* {}", report.period.describe()),
        format!("Charges: {}", money(currency, report.total_cost)),
        format!(
            "Credits Applied: {}",
            money(currency, report.credits_applied.abs())
        ),
        format!(
            "Net Charges: {}",
            money(currency, report.net_cost.max(Decimal::ZERO))
        ),
        format!(
            "Credits Remaining: {} of {} ({})",
            money(currency, state.remaining),
            money(currency, state.total_available),
            report.status
        ),
    ];

    if !report.by_service.is_empty() {
        let top: Vec<String> = report
            .by_service
            .sorted_desc()
            .into_iter()
            .take(TOP_SERVICES_IN_CHAT)
            .map(|e| format!("{} {}", e.key, money(currency, e.amount)))
            .collect();
        lines.push(format!("Top services: {}", top.join(", ")));
    }

    if let Some(projection) = &report.projection {
        lines.push(format!(
            "Est. exhaustion: {} ({} months)",
            projection.exhaustion_date,
            fixed(projection.months_remaining, 1)
        ));
    }

    if !report.degraded.is_empty() {
        lines.push(format!(
            "_Partial data: {} cost queries failed_",
            report.degraded.len()
        ));
    }

    lines.join("\n")
}

pub fn render_json(report: &BillingReport) -> Result<String, AppError> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn alert_for(report: &BillingReport) -> Option<Alert> {
    let (title, color) = match report.status {
        CreditStatus::Critical => ("Credits running low", AlertColor::Warning),
        CreditStatus::Exhausted => ("Credits exhausted", AlertColor::Danger),
        CreditStatus::Healthy | CreditStatus::Monitor => return None,
    };

    let currency = report.currency.as_str();
    let mut text = format!(
        "{} of {} credits remaining ({}% used).",
        money(currency, report.credit_state.remaining),
        money(currency, report.credit_state.total_available),
        fixed(report.credit_state.percent_used(), 1)
    );
    if let Some(projection) = &report.projection {
        text.push_str(&format!(
            "\nEstimated exhaustion: {}",
            projection.exhaustion_date
        ));
    }

    Some(Alert {
        title: title.to_string(),
        text,
        color,
        timestamp: report.generated_at,
    })
}

pub fn render_credit_analysis(analysis: &CreditAnalysis) -> String {
    let currency = analysis.currency.as_str();
    let mut lines = Vec::new();

    rule(&mut lines);
    lines.push("CREDIT ANALYSIS".into());
    rule(&mut lines);
    lines.push(format!(
        "Total Credits: {}",
        money(currency, analysis.credit_state.total_available)
    ));
    lines.push(format!(
        "Generated:     {}",
        analysis.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    let current = &analysis.current_month;
    section(&mut lines, "CURRENT MONTH");
    lines.push(format!("Period:          {}", current.period.describe()));
    lines.push(format!("Usage Cost:      {}", money(currency, current.usage_cost)));
    lines.push(format!(
        "Credits Applied: {}",
        money(currency, current.credits_applied.abs())
    ));
    lines.push(format!(
        "Net Cost:        {}",
        money(currency, current.net_cost.max(Decimal::ZERO))
    ));
    if let Some(coverage) = credit_coverage(current.usage_cost, current.credits_applied) {
        lines.push(format!("Credit Coverage: {}%", fixed(coverage, 1)));
    }

    let trend = &analysis.trend;
    let months = Decimal::from(analysis.trend_months.max(1));
    section(
        &mut lines,
        &format!("LAST {} MONTHS TREND", analysis.trend_months),
    );
    lines.push(format!("Usage:           {}", money(currency, trend.usage_cost)));
    lines.push(format!(
        "Credits:         {}",
        money(currency, trend.credits_applied.abs())
    ));
    lines.push(format!(
        "Monthly Average: {} usage, {} credits",
        money(currency, trend.usage_cost.checked_div(months).unwrap_or_default()),
        money(
            currency,
            trend.credits_applied.abs().checked_div(months).unwrap_or_default()
        )
    ));
    if !analysis.top_services.is_empty() {
        lines.push(String::new());
        lines.push("Top Services:".into());
        ranked(&mut lines, &analysis.top_services, currency, 5);
    }

    section(&mut lines, "LIFETIME CREDITS");
    credit_lines(&mut lines, &analysis.credit_state, analysis.status, currency);

    section(&mut lines, "EXHAUSTION PROJECTION");
    match &analysis.projection {
        Some(projection) if analysis.credit_state.remaining > Decimal::ZERO => {
            projection_lines(&mut lines, projection, analysis.monthly_burn_rate, currency);
        }
        _ => lines.push("Unable to calculate projection - insufficient data".into()),
    }

    if let Some(top) = analysis.top_services.sorted_desc().first() {
        section(&mut lines, "OPTIMIZATION SUGGESTIONS");
        lines.push(format!(
            "Highest Cost Service: {} ({})",
            top.key,
            money(currency, top.amount)
        ));
        lines.push(format!(
            "Share of Total:       {}%",
            fixed(percent_of(top.amount, analysis.top_services.total()), 1)
        ));
        for tip in suggestions_for(&top.key) {
            lines.push(format!("  - {tip}"));
        }
    }

    degraded_lines(&mut lines, &analysis.degraded);

    lines.push(String::new());
    rule(&mut lines);
    lines.join("\n")
}

pub fn render_diagnostics(report: &DiagnosticReport) -> String {
    let mut lines = vec![format!(
        "Diagnosing billing for period: {} to {}",
        report.start, report.end
    )];
    lines.push("=".repeat(60));

    section(&mut lines, "1. Cost metrics");
    for total in &report.metric_totals {
        match total.amount {
            Some(amount) => lines.push(format!("  {}: {amount} {}", total.metric, total.unit)),
            None => lines.push(format!("  {}: unavailable", total.metric)),
        }
    }

    section(&mut lines, "2. Services with charges");
    let charged: Vec<_> = report
        .services
        .sorted_desc()
        .into_iter()
        .filter(|e| e.amount > Decimal::ZERO)
        .collect();
    if charged.is_empty() {
        lines.push("  No services with charges found".into());
    } else {
        for entry in charged {
            lines.push(format!("  {}: {}", entry.key, entry.amount));
        }
    }

    section(&mut lines, "3. Record types");
    if report.record_types.is_empty() {
        lines.push("  No record types returned".into());
    }
    for entry in report.record_types.iter() {
        lines.push(format!("  {}: {}", entry.key, entry.amount));
    }

    degraded_lines(&mut lines, &report.degraded);
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::aggregate;
    use crate::credits::{compute_credit_state, project_exhaustion};
    use crate::models::{BillingPeriod, CostRecord, PeriodKind};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn d(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    fn record(key: &str, amount: &str) -> CostRecord {
        CostRecord {
            dimension_key: key.into(),
            amount: d(amount),
            currency_unit: "USD".into(),
            date: None,
        }
    }

    fn report() -> BillingReport {
        let credit_state = compute_credit_state(d("5000"), d("4600"));
        BillingReport {
            period: BillingPeriod {
                start: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                kind: PeriodKind::Months,
                count: 1,
            },
            total_cost: d("200.00"),
            usage_cost: d("200.00"),
            credits_applied: d("-150.00"),
            net_cost: d("50.00"),
            credit_state,
            status: CreditStatus::Critical,
            monthly_burn_rate: d("150"),
            projection: project_exhaustion(
                credit_state.remaining,
                d("150"),
                NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            ),
            by_service: aggregate(
                &[record("Amazon EC2", "120.00"), record("Amazon S3", "30.00")],
                d("0.01"),
            ),
            by_usage_type: aggregate(&[record("BoxUsage:t3.micro", "100.00")], d("0.01")),
            by_day: aggregate(
                &[record("2024-05-03", "2.00"), record("2024-05-02", "1.00")],
                d("0.01"),
            ),
            currency: "USD".into(),
            generated_at: Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
            degraded: vec![],
        }
    }

    fn line<'a>(text: &'a str, prefix: &str) -> &'a str {
        text.lines()
            .find(|l| l.starts_with(prefix))
            .unwrap_or_else(|| panic!("no line starting with {prefix:?} in:\n{text}"))
    }

    #[test]
    fn percent_guards_near_zero_total() {
        assert_eq!(percent_of(d("5"), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(percent_of(d("5"), d("0.009")), Decimal::ZERO);
        assert_eq!(percent_of(d("5"), d("10")), d("50"));
    }

    #[test]
    fn fixed_rounds_half_up_and_drops_negative_zero() {
        assert_eq!(fixed(d("0.125"), 2), "0.13");
        assert_eq!(fixed(d("2.675"), 2), "2.68");
        assert_eq!(fixed(d("-0.001"), 2), "0.00");
        assert_eq!(fixed(d("80"), 1), "80.0");
        assert_eq!(money("USD", d("0.1") + d("0.2")), "USD 0.30");
    }

    #[test]
    fn progress_bar_has_fixed_width() {
        assert_eq!(progress_bar(d("50"), 10).chars().count(), 10);
        assert_eq!(progress_bar(d("92"), 10), format!("{}{}", "█".repeat(9), "░"));
        assert_eq!(progress_bar(d("150"), 10), "█".repeat(10));
        assert_eq!(progress_bar(d("-5"), 4), "░".repeat(4));
    }

    #[test]
    fn console_lists_services_by_amount_with_share() {
        let out = render(&report());
        assert!(out.console.contains("  1. Amazon EC2: USD 120.00 (80.0%)"));
        assert!(out.console.contains("  2. Amazon S3: USD 30.00 (20.0%)"));
        assert!(out.console.contains("Status:            CRITICAL"));
        assert!(out.console.contains("Credit Coverage:   75.0%"));
    }

    #[test]
    fn daily_costs_are_chronological() {
        let console = render(&report()).console;
        let first = console.find("2024-05-02: USD 1.00").expect("first day");
        let second = console.find("2024-05-03: USD 2.00").expect("second day");
        assert!(first < second);
    }

    #[test]
    fn negative_net_cost_is_floored_only_for_display() {
        let mut report = report();
        report.credits_applied = d("-250.00");
        report.net_cost = crate::credits::compute_net_cost(report.usage_cost, report.credits_applied);
        assert_eq!(report.net_cost, d("-50"));

        let out = render(&report);
        assert_eq!(line(&out.console, "Net Cost:"), "Net Cost:          USD 0.00");
        assert_eq!(line(&out.chat, "Net Charges:"), "Net Charges: USD 0.00");
        assert_eq!(report.net_cost, d("-50"));
    }

    #[test]
    fn missing_projection_omits_the_block() {
        let mut report = report();
        report.monthly_burn_rate = Decimal::ZERO;
        report.projection =
            project_exhaustion(report.credit_state.remaining, Decimal::ZERO, report.period.end);

        let out = render(&report);
        assert!(!out.console.contains("PROJECTION"));
        assert!(!out.console.contains("Months Remaining"));
        assert!(!out.chat.contains("exhaustion"));
        for text in [&out.console, &out.chat] {
            assert!(!text.contains("inf"));
            assert!(!text.contains("NaN"));
        }
    }

    #[test]
    fn empty_report_still_renders() {
        let mut report = report();
        report.total_cost = Decimal::ZERO;
        report.usage_cost = Decimal::ZERO;
        report.credits_applied = Decimal::ZERO;
        report.net_cost = Decimal::ZERO;
        report.by_service = AggregatedCosts::default();
        report.by_usage_type = AggregatedCosts::default();
        report.by_day = AggregatedCosts::default();
        report.projection = None;
        report.degraded = vec![QueryFailure::new("total cost", "AccessDenied")];

        let out = render(&report);
        assert!(out.console.contains("(no costs above threshold)"));
        assert!(out.console.contains("! total cost: AccessDenied"));
        assert!(!out.console.contains("Credit Coverage"));
        assert!(out.chat.contains("_Partial data: 1 cost queries failed_"));
    }

    #[test]
    fn chat_is_condensed() {
        let chat = render(&report()).chat;
        assert!(chat.starts_with("*Billing report* 2024-05-02 to 2024-06-01"));
        assert!(chat.contains("Credits Remaining: USD 400.00 of USD 5000.00 (CRITICAL)"));
        assert!(chat.contains("Top services: Amazon EC2 USD 120.00, Amazon S3 USD 30.00"));
        assert!(chat.lines().count() < 10);
    }

    #[test]
    fn alert_only_for_low_credit() {
        let alert = alert_for(&report()).expect("critical alerts");
        assert_eq!(alert.color, AlertColor::Warning);
        assert!(alert.text.starts_with("USD 400.00 of USD 5000.00"));

        let mut exhausted = report();
        exhausted.status = CreditStatus::Exhausted;
        assert_eq!(alert_for(&exhausted).unwrap().color, AlertColor::Danger);

        let mut healthy = report();
        healthy.status = CreditStatus::Healthy;
        assert!(alert_for(&healthy).is_none());
    }

    #[test]
    fn json_output_is_parseable() {
        let json = render_json(&report()).expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "CRITICAL");
        assert_eq!(value["by_service"][0]["key"], "Amazon EC2");
    }
}
