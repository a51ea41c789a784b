//! Pure aggregation over canonical metric rows: KPI totals, period deltas,
//! daily series, and campaign rollups. No I/O.
//!
//! Every derived ratio follows the reporting surface's zero-denominator
//! policy: a ratio whose denominator is zero evaluates to exactly `0.0`,
//! never NaN, infinity, or an error.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{MetricRow, Platform};

/// Placeholder under which rows without a campaign name are grouped.
pub const UNNAMED_CAMPAIGN: &str = "(unnamed)";

/// `numerator / denominator`, or `0.0` when the denominator is zero.
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Base sums shared by totals, daily grouping, and campaign rollups.
/// Ratios are always derived from these grouped sums, never averaged from
/// per-row ratios.
#[derive(Debug, Clone, Copy, Default)]
struct Sums {
    spend: f64,
    impressions: i64,
    clicks: i64,
    conversations: i64,
    leads: i64,
    conversions: i64,
}

impl Sums {
    fn add(&mut self, row: &MetricRow) {
        self.spend += row.spend;
        self.impressions += row.impressions;
        self.clicks += row.clicks;
        self.conversations += row.conversations;
        self.leads += row.leads;
        self.conversions += row.conversions;
    }

    fn cost_per_click(&self) -> f64 {
        safe_div(self.spend, self.clicks as f64)
    }

    fn click_through_rate(&self) -> f64 {
        safe_div(self.clicks as f64, self.impressions as f64) * 100.0
    }

    fn cost_per_mille(&self) -> f64 {
        safe_div(self.spend, self.impressions as f64) * 1000.0
    }

    fn cost_per_action(&self) -> f64 {
        let actions = self.conversations + self.leads + self.conversions;
        safe_div(self.spend, actions as f64)
    }

    fn cost_per_conversation(&self) -> f64 {
        safe_div(self.spend, self.conversations as f64)
    }
}

/// Total spend, counters, and the five derived ratios for a row set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSet {
    pub spend: f64,
    pub impressions: i64,
    pub clicks: i64,
    pub conversations: i64,
    pub leads: i64,
    pub conversions: i64,
    pub cost_per_click: f64,
    pub click_through_rate: f64,
    pub cost_per_mille: f64,
    pub cost_per_action: f64,
    pub cost_per_conversation: f64,
}

impl From<Sums> for KpiSet {
    fn from(sums: Sums) -> Self {
        KpiSet {
            spend: sums.spend,
            impressions: sums.impressions,
            clicks: sums.clicks,
            conversations: sums.conversations,
            leads: sums.leads,
            conversions: sums.conversions,
            cost_per_click: sums.cost_per_click(),
            click_through_rate: sums.click_through_rate(),
            cost_per_mille: sums.cost_per_mille(),
            cost_per_action: sums.cost_per_action(),
            cost_per_conversation: sums.cost_per_conversation(),
        }
    }
}

/// Sum a row set into a [`KpiSet`]. An empty row set yields all zeros.
pub fn totals(rows: &[MetricRow]) -> KpiSet {
    let mut sums = Sums::default();
    for row in rows {
        sums.add(row);
    }
    sums.into()
}

/// Percentage change from `previous` to `current`, or `None` when there is
/// no baseline (`previous == 0`). `None` is distinct from `Some(0.0)`: the
/// former means "nothing to compare against", the latter "no change".
pub fn period_delta(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 {
        return None;
    }
    Some((current - previous) / previous * 100.0)
}

/// The period-over-period deltas the reporting surface displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaSet {
    pub spend: Option<f64>,
    pub impressions: Option<f64>,
    pub clicks: Option<f64>,
    pub cost_per_click: Option<f64>,
    pub conversations: Option<f64>,
    pub cost_per_conversation: Option<f64>,
}

pub fn delta_set(current: &KpiSet, previous: &KpiSet) -> DeltaSet {
    DeltaSet {
        spend: period_delta(current.spend, previous.spend),
        impressions: period_delta(current.impressions as f64, previous.impressions as f64),
        clicks: period_delta(current.clicks as f64, previous.clicks as f64),
        cost_per_click: period_delta(current.cost_per_click, previous.cost_per_click),
        conversations: period_delta(
            current.conversations as f64,
            previous.conversations as f64,
        ),
        cost_per_conversation: period_delta(
            current.cost_per_conversation,
            previous.cost_per_conversation,
        ),
    }
}

/// Metric selector for [`daily_series`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Spend,
    Impressions,
    Clicks,
    Conversations,
    Leads,
    Conversions,
    CostPerClick,
    CostPerConversation,
}

impl Metric {
    fn value_of(&self, sums: &Sums) -> f64 {
        match self {
            Metric::Spend => sums.spend,
            Metric::Impressions => sums.impressions as f64,
            Metric::Clicks => sums.clicks as f64,
            Metric::Conversations => sums.conversations as f64,
            Metric::Leads => sums.leads as f64,
            Metric::Conversions => sums.conversions as f64,
            Metric::CostPerClick => sums.cost_per_click(),
            Metric::CostPerConversation => sums.cost_per_conversation(),
        }
    }
}

/// One point of a daily series. `platform` is set only when the series was
/// requested broken down by platform.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    pub value: f64,
}

/// Group rows by date (and platform when `by_platform`), sum the base
/// fields per group, and evaluate `metric` on each group's sums. Ratio
/// metrics are computed from the grouped sums. Points come back in date
/// order, platforms in a fixed order within a date.
pub fn daily_series(rows: &[MetricRow], metric: Metric, by_platform: bool) -> Vec<SeriesPoint> {
    let mut groups: BTreeMap<(NaiveDate, Option<Platform>), Sums> = BTreeMap::new();
    for row in rows {
        let key = (row.date, by_platform.then_some(row.platform));
        groups.entry(key).or_default().add(row);
    }
    groups
        .into_iter()
        .map(|((date, platform), sums)| SeriesPoint {
            date,
            platform,
            value: metric.value_of(&sums),
        })
        .collect()
}

/// Per-(platform, campaign) totals with the same derived ratio set as
/// [`totals`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignRollup {
    pub platform: Platform,
    pub campaign_name: String,
    pub spend: f64,
    pub impressions: i64,
    pub clicks: i64,
    pub leads: i64,
    pub conversations: i64,
    pub conversions: i64,
    pub cost_per_click: f64,
    pub click_through_rate: f64,
    pub cost_per_mille: f64,
    pub cost_per_action: f64,
    pub cost_per_conversation: f64,
}

/// Group rows by (platform, campaign name) — a missing name groups under
/// [`UNNAMED_CAMPAIGN`] — and return the rollups sorted by spend
/// descending. Ties keep first-seen grouping order (the sort is stable).
pub fn campaign_rollup(rows: &[MetricRow]) -> Vec<CampaignRollup> {
    let mut order: Vec<(Platform, String)> = Vec::new();
    let mut index: HashMap<(Platform, String), usize> = HashMap::new();
    let mut sums: Vec<Sums> = Vec::new();

    for row in rows {
        let name = row
            .campaign_name
            .clone()
            .unwrap_or_else(|| UNNAMED_CAMPAIGN.to_string());
        let key = (row.platform, name);
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            sums.push(Sums::default());
            sums.len() - 1
        });
        sums[slot].add(row);
    }

    let mut rollups: Vec<CampaignRollup> = order
        .into_iter()
        .zip(sums)
        .map(|((platform, campaign_name), sums)| CampaignRollup {
            platform,
            campaign_name,
            spend: sums.spend,
            impressions: sums.impressions,
            clicks: sums.clicks,
            leads: sums.leads,
            conversations: sums.conversations,
            conversions: sums.conversions,
            cost_per_click: sums.cost_per_click(),
            click_through_rate: sums.click_through_rate(),
            cost_per_mille: sums.cost_per_mille(),
            cost_per_action: sums.cost_per_action(),
            cost_per_conversation: sums.cost_per_conversation(),
        })
        .collect();

    rollups.sort_by(|a, b| b.spend.partial_cmp(&a.spend).unwrap_or(std::cmp::Ordering::Equal));
    rollups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(date: &str, platform: Platform, campaign: Option<&str>) -> MetricRow {
        MetricRow {
            date: date.parse().unwrap(),
            platform,
            client_id: "client-1".into(),
            account_id: "act_1".into(),
            campaign_id: campaign.map(|c| format!("id-{c}")),
            campaign_name: campaign.map(str::to_string),
            spend: 0.0,
            impressions: 0,
            reach: 0,
            clicks: 0,
            leads: 0,
            conversations: 0,
            conversions: 0,
            revenue: 0.0,
        }
    }

    #[test]
    fn totals_sums_spend_exactly() {
        let mut a = row("2026-03-01", Platform::Meta, Some("a"));
        a.spend = 10.5;
        a.clicks = 4;
        let mut b = row("2026-03-02", Platform::Google, Some("b"));
        b.spend = 20.25;
        b.clicks = 6;
        let kpis = totals(&[a, b]);
        assert_eq!(kpis.spend, 30.75);
        assert_eq!(kpis.clicks, 10);
        assert_eq!(kpis.cost_per_click, 3.075);
    }

    #[test]
    fn zero_clicks_means_zero_cost_per_click_even_with_spend() {
        let mut a = row("2026-03-01", Platform::Meta, Some("a"));
        a.spend = 99.9;
        let kpis = totals(&[a]);
        assert_eq!(kpis.cost_per_click, 0.0);
        assert_eq!(kpis.click_through_rate, 0.0);
        assert_eq!(kpis.cost_per_mille, 0.0);
        assert_eq!(kpis.cost_per_action, 0.0);
        assert_eq!(kpis.cost_per_conversation, 0.0);
    }

    #[test]
    fn totals_of_empty_rows_is_all_zero() {
        let kpis = totals(&[]);
        assert_eq!(kpis.spend, 0.0);
        assert_eq!(kpis.impressions, 0);
        assert_eq!(kpis.cost_per_click, 0.0);
    }

    #[test]
    fn delta_against_zero_baseline_is_absent() {
        assert_eq!(period_delta(10.0, 0.0), None);
        assert_eq!(period_delta(0.0, 0.0), None);
        assert_eq!(period_delta(10.0, 5.0), Some(100.0));
        assert_eq!(period_delta(5.0, 10.0), Some(-50.0));
    }

    #[test]
    fn cost_per_action_pools_all_action_counters() {
        let mut a = row("2026-03-01", Platform::Meta, Some("a"));
        a.spend = 60.0;
        a.conversations = 2;
        a.leads = 3;
        a.conversions = 1;
        let kpis = totals(&[a]);
        assert_eq!(kpis.cost_per_action, 10.0);
        assert_eq!(kpis.cost_per_conversation, 30.0);
    }

    #[test]
    fn daily_series_computes_ratios_from_grouped_sums() {
        // Two rows on one day: 10/1 and 10/9. Ratio of sums is 20/10 = 2.0,
        // while the mean of per-row ratios would be (10 + 10/9) / 2.
        let mut a = row("2026-03-01", Platform::Meta, Some("a"));
        a.spend = 10.0;
        a.clicks = 1;
        let mut b = row("2026-03-01", Platform::Google, Some("b"));
        b.spend = 10.0;
        b.clicks = 9;
        let series = daily_series(&[a, b], Metric::CostPerClick, false);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].value, 2.0);
        assert_eq!(series[0].platform, None);
    }

    #[test]
    fn daily_series_breakdown_orders_dates_then_platforms() {
        let mut a = row("2026-03-02", Platform::Google, Some("g"));
        a.spend = 3.0;
        let mut b = row("2026-03-01", Platform::Meta, Some("m"));
        b.spend = 1.0;
        let mut c = row("2026-03-01", Platform::Google, Some("g"));
        c.spend = 2.0;
        let series = daily_series(&[a, b, c], Metric::Spend, true);
        let got: Vec<(NaiveDate, Option<Platform>, f64)> =
            series.iter().map(|p| (p.date, p.platform, p.value)).collect();
        assert_eq!(
            got,
            vec![
                ("2026-03-01".parse().unwrap(), Some(Platform::Meta), 1.0),
                ("2026-03-01".parse().unwrap(), Some(Platform::Google), 2.0),
                ("2026-03-02".parse().unwrap(), Some(Platform::Google), 3.0),
            ]
        );
    }

    #[test]
    fn daily_series_zero_denominator_group_is_zero() {
        let mut a = row("2026-03-01", Platform::Meta, Some("a"));
        a.spend = 15.0;
        let series = daily_series(&[a], Metric::CostPerConversation, false);
        assert_eq!(series[0].value, 0.0);
    }

    #[test]
    fn campaign_rollup_sorts_by_spend_descending() {
        let mut a = row("2026-03-01", Platform::Meta, Some("alpha"));
        a.spend = 300.0;
        let mut b = row("2026-03-01", Platform::Meta, Some("beta"));
        b.spend = 100.0;
        let mut c = row("2026-03-01", Platform::Google, Some("gamma"));
        c.spend = 200.0;
        let rollups = campaign_rollup(&[b, a, c]);
        let spends: Vec<f64> = rollups.iter().map(|r| r.spend).collect();
        assert_eq!(spends, vec![300.0, 200.0, 100.0]);
    }

    #[test]
    fn campaign_rollup_groups_unnamed_campaigns_under_placeholder() {
        let mut a = row("2026-03-01", Platform::Meta, None);
        a.spend = 5.0;
        let mut b = row("2026-03-02", Platform::Meta, None);
        b.spend = 7.0;
        let rollups = campaign_rollup(&[a, b]);
        assert_eq!(rollups.len(), 1);
        assert_eq!(rollups[0].campaign_name, UNNAMED_CAMPAIGN);
        assert_eq!(rollups[0].spend, 12.0);
    }

    #[test]
    fn campaign_rollup_keeps_same_name_on_different_platforms_apart() {
        let mut a = row("2026-03-01", Platform::Meta, Some("brand"));
        a.spend = 10.0;
        let mut b = row("2026-03-01", Platform::Google, Some("brand"));
        b.spend = 10.0;
        let rollups = campaign_rollup(&[a, b]);
        assert_eq!(rollups.len(), 2);
    }

    #[test]
    fn campaign_rollup_ties_keep_first_seen_order() {
        let mut a = row("2026-03-01", Platform::Meta, Some("first"));
        a.spend = 50.0;
        let mut b = row("2026-03-01", Platform::Meta, Some("second"));
        b.spend = 50.0;
        let rollups = campaign_rollup(&[a, b]);
        assert_eq!(rollups[0].campaign_name, "first");
        assert_eq!(rollups[1].campaign_name, "second");
    }

    #[test]
    fn delta_set_distinguishes_absent_from_zero_change() {
        let current = totals(&{
            let mut a = row("2026-03-01", Platform::Meta, Some("a"));
            a.spend = 10.0;
            a.clicks = 5;
            vec![a]
        });
        let previous = totals(&[]);
        let deltas = delta_set(&current, &previous);
        assert_eq!(deltas.spend, None);
        assert_eq!(deltas.clicks, None);

        let unchanged = delta_set(&current, &current);
        assert_eq!(unchanged.spend, Some(0.0));
    }
}
