//! Dashboard aggregation over a set of fetched orders.
//!
//! Everything here works on plain snapshots already loaded into memory; the
//! admin service fetches the orders for a date range and calls [`summarize`].

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;

use crate::{Money, OrderStatus, ProductId};

/// Number of products reported in [`DashboardSummary::top_products`].
pub const DEFAULT_TOP_PRODUCTS: usize = 5;

/// One order line as seen by the aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemSnapshot {
    pub product_id: Option<ProductId>,
    pub product_name: String,
    pub quantity: u32,
    pub line_total: Money,
}

/// One order as seen by the aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSnapshot {
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub total: Money,
    pub items: Vec<ItemSnapshot>,
}

/// An inclusive range of calendar days (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// The `days` days ending with `today`, inclusive. `days` is at least 1.
    #[must_use]
    pub fn last_days(today: NaiveDate, days: u32) -> Self {
        let back = u64::from(days.max(1) - 1);
        Self {
            start: today.checked_sub_days(Days::new(back)).unwrap_or(NaiveDate::MIN),
            end: today,
        }
    }

    /// Whether the timestamp falls on a day inside the range.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        self.start <= day && day <= self.end
    }

    /// First instant of the range.
    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// First instant after the range.
    #[must_use]
    pub fn end_time(&self) -> DateTime<Utc> {
        self.end
            .succ_opt()
            .unwrap_or(NaiveDate::MAX)
            .and_time(chrono::NaiveTime::MIN)
            .and_utc()
    }

    /// Every day in the range, ascending.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(|day| *day <= self.end)
    }
}

/// Revenue for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: Money,
    pub orders: u32,
}

/// A best-selling product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopProduct {
    pub product_id: Option<ProductId>,
    pub name: String,
    pub quantity: u64,
    pub revenue: Money,
}

/// Number of orders in one status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: u64,
}

/// Aggregated dashboard figures for a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub range: DateRange,
    /// Orders placed in the range, any status.
    pub order_count: u64,
    /// Orders placed in the range that count towards revenue.
    pub paid_order_count: u64,
    pub total_revenue: Money,
    pub average_order_value: Money,
    pub revenue_by_day: Vec<DailyRevenue>,
    pub top_products: Vec<TopProduct>,
    pub status_counts: Vec<StatusCount>,
}

#[derive(Hash, PartialEq, Eq)]
enum ProductKey {
    Id(ProductId),
    Name(String),
}

/// Aggregate the orders placed within `range`.
///
/// Cancelled orders appear in `status_counts` and `order_count` only. Orders
/// outside the range are ignored.
#[must_use]
pub fn summarize(orders: &[OrderSnapshot], range: DateRange, top_n: usize) -> DashboardSummary {
    let mut by_day: BTreeMap<NaiveDate, DailyRevenue> = range
        .days()
        .map(|date| {
            (
                date,
                DailyRevenue {
                    date,
                    revenue: Money::ZERO,
                    orders: 0,
                },
            )
        })
        .collect();
    let mut statuses: HashMap<OrderStatus, u64> = HashMap::new();
    let mut products: HashMap<ProductKey, TopProduct> = HashMap::new();
    let mut order_count = 0_u64;
    let mut paid_order_count = 0_u64;
    let mut total_revenue = Money::ZERO;

    for order in orders.iter().filter(|o| range.contains(o.created_at)) {
        order_count += 1;
        *statuses.entry(order.status).or_default() += 1;

        if !order.status.counts_as_revenue() {
            continue;
        }

        paid_order_count += 1;
        total_revenue += order.total;
        if let Some(day) = by_day.get_mut(&order.created_at.date_naive()) {
            day.revenue += order.total;
            day.orders += 1;
        }

        for item in &order.items {
            let key = item
                .product_id
                .map_or_else(|| ProductKey::Name(item.product_name.clone()), ProductKey::Id);
            let entry = products.entry(key).or_insert_with(|| TopProduct {
                product_id: item.product_id,
                name: item.product_name.clone(),
                quantity: 0,
                revenue: Money::ZERO,
            });
            entry.quantity += u64::from(item.quantity);
            entry.revenue += item.line_total;
        }
    }

    let mut top_products: Vec<TopProduct> = products.into_values().collect();
    top_products.sort_by(|a, b| {
        b.quantity
            .cmp(&a.quantity)
            .then_with(|| b.revenue.cmp(&a.revenue))
            .then_with(|| a.name.cmp(&b.name))
    });
    top_products.truncate(top_n);

    let status_counts = OrderStatus::ALL
        .into_iter()
        .map(|status| StatusCount {
            status,
            count: statuses.get(&status).copied().unwrap_or(0),
        })
        .collect();

    DashboardSummary {
        range,
        order_count,
        paid_order_count,
        total_revenue,
        average_order_value: total_revenue.average_over(
            usize::try_from(paid_order_count).unwrap_or(usize::MAX),
        ),
        revenue_by_day: by_day.into_values().collect(),
        top_products,
        status_counts,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn order(d: u32, status: OrderStatus, items: &[(i32, &str, u32, i64)]) -> OrderSnapshot {
        let items: Vec<ItemSnapshot> = items
            .iter()
            .map(|(id, name, qty, cents)| ItemSnapshot {
                product_id: Some(ProductId::new(*id)),
                product_name: (*name).to_owned(),
                quantity: *qty,
                line_total: Money::from_cents(*cents),
            })
            .collect();
        OrderSnapshot {
            created_at: Utc.with_ymd_and_hms(2025, 6, d, 15, 0, 0).unwrap(),
            status,
            total: items.iter().map(|i| i.line_total).sum(),
            items,
        }
    }

    fn range() -> DateRange {
        DateRange {
            start: day(1),
            end: day(5),
        }
    }

    #[test]
    fn test_last_days() {
        let range = DateRange::last_days(day(30), 30);
        assert_eq!(range.start, day(1));
        assert_eq!(range.end, day(30));
        assert_eq!(range.days().count(), 30);

        let single = DateRange::last_days(day(10), 0);
        assert_eq!(single.start, single.end);
    }

    #[test]
    fn test_range_bounds() {
        let r = range();
        assert!(r.contains(Utc.with_ymd_and_hms(2025, 6, 5, 23, 59, 59).unwrap()));
        assert!(!r.contains(Utc.with_ymd_and_hms(2025, 6, 6, 0, 0, 0).unwrap()));
        assert_eq!(r.end_time(), Utc.with_ymd_and_hms(2025, 6, 6, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_empty_summary_has_zero_days() {
        let summary = summarize(&[], range(), DEFAULT_TOP_PRODUCTS);
        assert_eq!(summary.order_count, 0);
        assert_eq!(summary.total_revenue, Money::ZERO);
        assert_eq!(summary.average_order_value, Money::ZERO);
        assert_eq!(summary.revenue_by_day.len(), 5);
        assert!(summary.revenue_by_day.iter().all(|d| d.revenue == Money::ZERO));
        assert_eq!(summary.status_counts.len(), OrderStatus::ALL.len());
    }

    #[test]
    fn test_cancelled_orders_excluded_from_revenue() {
        let orders = [
            order(1, OrderStatus::Delivered, &[(1, "Mug", 2, 2000)]),
            order(2, OrderStatus::Cancelled, &[(1, "Mug", 5, 5000)]),
            order(2, OrderStatus::Pending, &[(2, "Tea", 1, 1000)]),
        ];
        let summary = summarize(&orders, range(), DEFAULT_TOP_PRODUCTS);

        assert_eq!(summary.order_count, 3);
        assert_eq!(summary.paid_order_count, 2);
        assert_eq!(summary.total_revenue, Money::from_cents(3000));
        assert_eq!(summary.average_order_value, Money::from_cents(1500));

        let cancelled = summary
            .status_counts
            .iter()
            .find(|c| c.status == OrderStatus::Cancelled)
            .unwrap();
        assert_eq!(cancelled.count, 1);

        let mug = summary
            .top_products
            .iter()
            .find(|p| p.name == "Mug")
            .unwrap();
        assert_eq!(mug.quantity, 2);
    }

    #[test]
    fn test_revenue_by_day_is_ascending_and_complete() {
        let orders = [
            order(3, OrderStatus::Shipped, &[(1, "Mug", 1, 1000)]),
            order(1, OrderStatus::Pending, &[(1, "Mug", 1, 500)]),
            order(3, OrderStatus::Processing, &[(2, "Tea", 1, 250)]),
        ];
        let summary = summarize(&orders, range(), DEFAULT_TOP_PRODUCTS);
        let days: Vec<NaiveDate> = summary.revenue_by_day.iter().map(|d| d.date).collect();
        assert_eq!(days, vec![day(1), day(2), day(3), day(4), day(5)]);
        assert_eq!(summary.revenue_by_day[2].revenue, Money::from_cents(1250));
        assert_eq!(summary.revenue_by_day[2].orders, 2);
        assert_eq!(summary.revenue_by_day[1].revenue, Money::ZERO);
    }

    #[test]
    fn test_orders_outside_range_ignored() {
        let orders = [order(9, OrderStatus::Delivered, &[(1, "Mug", 1, 1000)])];
        let summary = summarize(&orders, range(), DEFAULT_TOP_PRODUCTS);
        assert_eq!(summary.order_count, 0);
        assert!(summary.top_products.is_empty());
    }

    #[test]
    fn test_top_products_ordering_and_truncation() {
        let orders = [
            order(1, OrderStatus::Delivered, &[(1, "Mug", 3, 3000), (2, "Tea", 3, 6000)]),
            order(2, OrderStatus::Delivered, &[(3, "Bowl", 5, 1000), (4, "Cup", 1, 100)]),
        ];
        let summary = summarize(&orders, range(), 3);
        let names: Vec<&str> = summary.top_products.iter().map(|p| p.name.as_str()).collect();
        // Bowl sells most; Tea beats Mug on revenue at equal quantity
        assert_eq!(names, vec!["Bowl", "Tea", "Mug"]);
    }

    #[test]
    fn test_deleted_products_grouped_by_name() {
        let mut first = order(1, OrderStatus::Delivered, &[(1, "Old Mug", 1, 100)]);
        first.items[0].product_id = None;
        let mut second = order(2, OrderStatus::Delivered, &[(1, "Old Mug", 2, 200)]);
        second.items[0].product_id = None;

        let summary = summarize(&[first, second], range(), DEFAULT_TOP_PRODUCTS);
        assert_eq!(summary.top_products.len(), 1);
        assert_eq!(summary.top_products[0].quantity, 3);
        assert_eq!(summary.top_products[0].product_id, None);
    }
}
