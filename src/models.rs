//! Domain records exchanged with the scheduling backend.
//!
//! Shapes mirror the wire format exactly (snake_case JSON, `{count, next,
//! previous, results}` pages). Records reference each other by id: an
//! `Order` owns its `OriginItem`s, an `OriginItem` optionally owns one
//! production `Item`, and an `Item` points at a `Flow` and optionally a
//! `Stage` within that flow.

use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

// ── Invalidation tags ─────────────────────────────────────────────────

/// Coarse invalidation label grouping cache entries by resource.
///
/// Write endpoints name the tags whose entries they make stale; read
/// endpoints name the tags their entries carry. Over-tagging costs an
/// extra refetch; under-tagging leaves stale reads, which the endpoint
/// tests treat as a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    Orders,
    OriginItems,
    Items,
    Flows,
    Stages,
    Capacities,
    Categories,
    Comments,
    SalesOrders,
    Users,
    Calendar,
    CompanyProfile,
    UserProfile,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Orders => "orders",
            Self::OriginItems => "origin-items",
            Self::Items => "items",
            Self::Flows => "flows",
            Self::Stages => "stages",
            Self::Capacities => "capacities",
            Self::Categories => "categories",
            Self::Comments => "comments",
            Self::SalesOrders => "sales-orders",
            Self::Users => "users",
            Self::Calendar => "calendar",
            Self::CompanyProfile => "company-profile",
            Self::UserProfile => "user-profile",
        }
    }
}

impl FromStr for Tag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orders" => Ok(Self::Orders),
            "origin-items" => Ok(Self::OriginItems),
            "items" => Ok(Self::Items),
            "flows" => Ok(Self::Flows),
            "stages" => Ok(Self::Stages),
            "capacities" => Ok(Self::Capacities),
            "categories" => Ok(Self::Categories),
            "comments" => Ok(Self::Comments),
            "sales-orders" => Ok(Self::SalesOrders),
            "users" => Ok(Self::Users),
            "calendar" => Ok(Self::Calendar),
            "company-profile" => Ok(Self::CompanyProfile),
            "user-profile" => Ok(Self::UserProfile),
            _ => Err(format!("Invalid tag: {}", s)),
        }
    }
}

// ── Pagination ────────────────────────────────────────────────────────

/// One page of a list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            count: 0,
            next: None,
            previous: None,
            results: Vec::new(),
        }
    }
}

// ── Orders and items ──────────────────────────────────────────────────

/// A customer order mirrored from the ERP system. Orders are read-only on
/// this side; scheduling happens on the production `Item`s beneath them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub invoice: String,
    pub customer: String,
    pub ship_date: Option<NaiveDate>,
    pub c_name: String,
    pub c_city: String,
    pub count_items: i64,
    pub completed: bool,
    #[serde(default)]
    pub sales_order: Option<SalesOrder>,
    #[serde(default)]
    pub origin_items: Vec<OriginItem>,
}

/// A line of an order as it came from the ERP. `item` stays null until
/// production scheduling begins for this line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginItem {
    pub id: String,
    pub order: String,
    pub category: String,
    pub description: String,
    pub quantity: String,
    pub shipped: String,
    pub ship_date: Option<NaiveDate>,
    pub completed: bool,
    #[serde(default)]
    pub item: Option<Item>,
}

/// A scheduled production item.
///
/// Scheduling is a one-way progression: unscheduled (`flow` null) →
/// flow-assigned (`stage` reset to null) → staged. Assigning a new flow
/// always clears `stage`; the stage must be re-chosen inside the new flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub origin_item: String,
    #[serde(default)]
    pub flow: Option<FlowRef>,
    #[serde(default)]
    pub stage: Option<StageRef>,
    pub production_date: Option<NaiveDate>,
    pub priority: i64,
    pub packages: i64,
    pub location: i64,
    pub time: Option<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

/// Flow as embedded inside an item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRef {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

/// Stage as embedded inside an item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRef {
    pub id: i64,
    pub name: String,
    pub color: String,
}

// ── Flows, stages, capacities ─────────────────────────────────────────

/// A production flow: an ordered sequence of stages within a category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub id: i64,
    pub name: String,
    pub category: i64,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

/// One column of the flow board, ordered by `position`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub id: i64,
    pub name: String,
    pub position: i64,
    pub color: String,
    pub flow: i64,
    #[serde(default)]
    pub item_ids: Vec<i64>,
}

/// Daily production capacity for one category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capacity {
    pub id: i64,
    pub category: i64,
    pub per_day: i64,
}

/// Product category with its aggregate capacity numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub capacity: Option<i64>,
    pub total_capacity: Option<i64>,
    pub capacity_id: Option<i64>,
    pub flow_count: i64,
}

// ── Comments, sales orders, users ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub user: CommentAuthor,
    pub item: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesOrder {
    pub id: i64,
    pub order: String,
    pub priority: i64,
    pub packages: i64,
    pub production_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    #[serde(default)]
    pub category: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub id: i64,
    pub name: String,
    pub working_weekend: bool,
}

/// Per-user display preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub user: i64,
    pub page_size: i64,
    #[serde(default)]
    pub show_columns: Vec<String>,
}

// ── Calendar ──────────────────────────────────────────────────────────

/// Capacity usage for one category on one day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyCategoryLoad {
    pub capacity: i64,
    pub count_orders: i64,
}

/// One month of the capacity calendar: per-date entries mapping category
/// names to [`DailyCategoryLoad`], plus a `capacity_data` summary row.
/// The date keys are dynamic, so the month stays a map at this level.
pub type CalendarMonth = std::collections::BTreeMap<String, serde_json::Value>;

// ── Write bodies ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemDraft {
    pub order: String,
    pub origin_item: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production_date: Option<NaiveDate>,
}

/// Partial update for an item. Only `Some` fields are sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityDraft {
    pub category: i64,
    pub per_day: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapacityPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_day: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDraft {
    pub name: String,
    pub category: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDraft {
    pub name: String,
    pub color: String,
    pub flow: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StagePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentDraft {
    pub item: i64,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SalesOrderPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDraft {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    #[serde(default)]
    pub category: Vec<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
}

// ── Push-channel deltas ───────────────────────────────────────────────

/// A partial record received on the push channel, validated at the
/// boundary before it touches the cache. Every mergeable field is an
/// `Option`; the merge destructures the delta exhaustively so a new field
/// cannot be forgotten silently.
#[derive(Debug, Clone)]
pub enum RecordDelta {
    Order(OrderDelta),
    Item(ItemDelta),
}

impl RecordDelta {
    /// The id of the record this delta targets, as a JSON value usable to
    /// match against cached list rows.
    pub fn id(&self) -> serde_json::Value {
        match self {
            Self::Order(d) => json!(d.id),
            Self::Item(d) => json!(d.id),
        }
    }

    /// Field-level merge into a cached record object. Returns false when
    /// the target is not an object (nothing merged).
    pub fn merge_into(&self, record: &mut serde_json::Value) -> bool {
        match self {
            Self::Order(d) => d.merge_into(record),
            Self::Item(d) => d.merge_into(record),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderDelta {
    pub id: String,
    #[serde(default)]
    pub invoice: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub ship_date: Option<NaiveDate>,
    #[serde(default)]
    pub c_name: Option<String>,
    #[serde(default)]
    pub c_city: Option<String>,
    #[serde(default)]
    pub count_items: Option<i64>,
    #[serde(default)]
    pub completed: Option<bool>,
}

impl OrderDelta {
    pub fn merge_into(&self, record: &mut serde_json::Value) -> bool {
        let Some(obj) = record.as_object_mut() else {
            return false;
        };
        // Exhaustive destructure: a new delta field fails to compile until
        // it is merged here.
        let Self {
            id: _,
            invoice,
            customer,
            ship_date,
            c_name,
            c_city,
            count_items,
            completed,
        } = self;
        if let Some(v) = invoice {
            obj.insert("invoice".into(), json!(v));
        }
        if let Some(v) = customer {
            obj.insert("customer".into(), json!(v));
        }
        if let Some(v) = ship_date {
            obj.insert("ship_date".into(), json!(v));
        }
        if let Some(v) = c_name {
            obj.insert("c_name".into(), json!(v));
        }
        if let Some(v) = c_city {
            obj.insert("c_city".into(), json!(v));
        }
        if let Some(v) = count_items {
            obj.insert("count_items".into(), json!(v));
        }
        if let Some(v) = completed {
            obj.insert("completed".into(), json!(v));
        }
        true
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemDelta {
    pub id: i64,
    #[serde(default)]
    pub flow: Option<FlowRef>,
    #[serde(default)]
    pub stage: Option<StageRef>,
    #[serde(default)]
    pub production_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub packages: Option<i64>,
    #[serde(default)]
    pub location: Option<i64>,
    #[serde(default)]
    pub time: Option<String>,
}

impl ItemDelta {
    pub fn merge_into(&self, record: &mut serde_json::Value) -> bool {
        let Some(obj) = record.as_object_mut() else {
            return false;
        };
        let Self {
            id: _,
            flow,
            stage,
            production_date,
            priority,
            packages,
            location,
            time,
        } = self;
        if let Some(v) = flow {
            obj.insert("flow".into(), json!(v));
            // Flow reassignment restarts staging inside the new flow.
            obj.insert("stage".into(), serde_json::Value::Null);
        }
        if let Some(v) = stage {
            obj.insert("stage".into(), json!(v));
        }
        if let Some(v) = production_date {
            obj.insert("production_date".into(), json!(v));
        }
        if let Some(v) = priority {
            obj.insert("priority".into(), json!(v));
        }
        if let Some(v) = packages {
            obj.insert("packages".into(), json!(v));
        }
        if let Some(v) = location {
            obj.insert("location".into(), json!(v));
        }
        if let Some(v) = time {
            obj.insert("time".into(), json!(v));
        }
        true
    }
}

// ── Provisional ids ───────────────────────────────────────────────────

static NEXT_PROVISIONAL_ID: AtomicI64 = AtomicI64::new(-1);

/// Allocate a client-side id for a speculatively inserted record.
///
/// Server ids are positive; provisional ids count down from -1 so a
/// reconciling refetch can never collide with a real row.
pub fn provisional_id() -> i64 {
    NEXT_PROVISIONAL_ID.fetch_sub(1, Ordering::Relaxed)
}

/// Whether an id was allocated client-side by [`provisional_id`].
pub fn is_provisional(id: i64) -> bool {
    id < 0
}
