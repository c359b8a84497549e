//! Declarative endpoint definitions and the typed operations built on
//! them.
//!
//! Each definition names the HTTP operation plus the tags it provides
//! (reads) or invalidates (writes). The tag sets are the coarse
//! dependency graph that keeps the cache fresh: over-tagging costs a
//! refetch, under-tagging leaves stale reads, so every write's tag set
//! is pinned by the completeness test at the bottom of this file.
//!
//! Operations that must feel instantaneous (scheduling an item, moving a
//! stage card, adding a capacity row) take the currently-visible list's
//! parameters and patch that entry optimistically before the request
//! goes out; the two-phase command in `SyncClient::run_mutation` keeps
//! or reverts the patch when the request settles.

use serde_json::{Value, json};

use crate::api::client::HttpMethod;
use crate::cache::{CacheKey, MutationCommand, QueryParams, Resource};
use crate::client::SyncClient;
use crate::errors::ApiError;
use crate::models::{
    CalendarMonth, Capacity, CapacityDraft, CapacityPatch, Category, Comment, CommentDraft, Flow,
    FlowDraft, FlowPatch, Item, ItemDraft, ItemPatch, Order, OriginItem, Page, PasswordChange,
    SalesOrder, SalesOrderPatch, Stage, StageDraft, StagePatch, Tag, User, UserDraft, UserPatch,
    provisional_id,
};

/// One remote operation: method, path template, and its tag edges.
#[derive(Debug)]
pub struct EndpointDef {
    pub name: &'static str,
    pub method: HttpMethod,
    pub path: &'static str,
    pub provides: &'static [Tag],
    pub invalidates: &'static [Tag],
}

impl EndpointDef {
    fn path_with(&self, id: impl std::fmt::Display) -> String {
        self.path.replace("{id}", &id.to_string())
    }
}

macro_rules! read_def {
    ($name:ident, $endpoint:literal, $path:literal, $provides:expr) => {
        pub const $name: EndpointDef = EndpointDef {
            name: $endpoint,
            method: HttpMethod::Get,
            path: $path,
            provides: &$provides,
            invalidates: &[],
        };
    };
}

macro_rules! write_def {
    ($name:ident, $endpoint:literal, $method:ident, $path:literal, $invalidates:expr) => {
        pub const $name: EndpointDef = EndpointDef {
            name: $endpoint,
            method: HttpMethod::$method,
            path: $path,
            provides: &[],
            invalidates: &$invalidates,
        };
    };
}

// ── Orders and ERP views ──────────────────────────────────────────────

read_def!(GET_ORDERS, "getOrders", "orders/", [Tag::Orders]);
read_def!(GET_ORDER, "getOrder", "orders/{id}/", [Tag::Orders]);
read_def!(GET_ORIGIN_ITEMS, "getOriginItems", "orders/items/", [Tag::OriginItems]);
read_def!(GET_CALENDAR, "getCalendar", "calendar/{id}/", [Tag::Calendar]);
read_def!(GET_CATEGORIES, "getCategories", "categories/", [Tag::Categories]);
read_def!(GET_ALL_CATEGORIES, "getAllCategories", "categories/all/", [Tag::Categories]);

// ── Production items ──────────────────────────────────────────────────

read_def!(GET_ITEMS, "getItems", "items/", [Tag::Items]);
read_def!(GET_ITEM, "getItem", "items/{id}/", [Tag::Items]);
write_def!(ADD_ITEM, "addItem", Post, "items/",
    [Tag::Items, Tag::Orders, Tag::OriginItems]);
write_def!(PATCH_ITEM, "patchItem", Patch, "items/{id}/",
    [Tag::Items, Tag::Orders, Tag::OriginItems, Tag::Categories, Tag::Capacities]);
write_def!(REMOVE_ITEM, "removeItem", Delete, "items/{id}/",
    [Tag::Items, Tag::Orders, Tag::OriginItems]);
write_def!(RESET_ITEM_STAGES, "resetItemStages", Delete, "items/{id}/reset-stages/",
    [Tag::Items, Tag::Orders, Tag::OriginItems]);

// ── Flows and stages ──────────────────────────────────────────────────

read_def!(GET_FLOWS, "getFlows", "flows/", [Tag::Flows]);
read_def!(GET_ALL_FLOWS, "getAllFlows", "flows/all/", [Tag::Flows]);
read_def!(GET_FLOW, "getFlow", "flows/{id}/", [Tag::Flows]);
write_def!(ADD_FLOW, "addFlow", Post, "flows/", [Tag::Flows, Tag::Stages, Tag::Categories]);
write_def!(PATCH_FLOW, "patchFlow", Patch, "flows/{id}/", [Tag::Flows]);
write_def!(REMOVE_FLOW, "removeFlow", Delete, "flows/{id}/",
    [Tag::Flows, Tag::Categories, Tag::Stages]);

read_def!(GET_STAGES, "getStages", "stages/", [Tag::Stages]);
read_def!(GET_ALL_STAGES, "getAllStages", "stages/all/", [Tag::Stages]);
read_def!(GET_STAGE, "getStage", "stages/{id}/", [Tag::Stages]);
write_def!(ADD_STAGE, "addStage", Post, "stages/", [Tag::Stages]);
write_def!(PATCH_STAGE, "patchStage", Patch, "stages/{id}/", [Tag::Stages]);
write_def!(REMOVE_STAGE, "removeStage", Delete, "stages/{id}/", [Tag::Stages]);

// ── Capacities ────────────────────────────────────────────────────────

read_def!(GET_CAPACITIES, "getCapacities", "capacities/", [Tag::Capacities]);
read_def!(GET_CAPACITY, "getCapacity", "capacities/{id}/", [Tag::Capacities]);
write_def!(ADD_CAPACITY, "addCapacity", Post, "capacities/",
    [Tag::Capacities, Tag::Flows, Tag::Categories, Tag::Calendar]);
write_def!(PATCH_CAPACITY, "patchCapacity", Patch, "capacities/{id}/",
    [Tag::Capacities, Tag::Flows, Tag::Categories, Tag::Calendar]);
write_def!(REMOVE_CAPACITY, "removeCapacity", Delete, "capacities/{id}/",
    [Tag::Capacities, Tag::Flows, Tag::Categories]);

// ── Comments ──────────────────────────────────────────────────────────

read_def!(GET_COMMENTS, "getComments", "comments/", [Tag::Comments]);
read_def!(GET_COMMENT, "getComment", "comments/{id}/", [Tag::Comments]);
write_def!(ADD_COMMENT, "addComment", Post, "comments/", [Tag::Comments, Tag::Orders, Tag::Items]);
write_def!(PATCH_COMMENT, "patchComment", Patch, "comments/{id}/", [Tag::Comments]);
write_def!(REMOVE_COMMENT, "removeComment", Delete, "comments/{id}/", [Tag::Comments]);

// ── Sales orders ──────────────────────────────────────────────────────

read_def!(GET_SALES_ORDERS, "getSalesOrders", "sales-orders/", [Tag::SalesOrders]);
write_def!(PATCH_SALES_ORDER, "patchSalesOrder", Patch, "sales-orders/{id}/",
    [Tag::SalesOrders, Tag::Orders]);

// ── Users and profiles ────────────────────────────────────────────────

read_def!(GET_USERS, "getUsers", "users/", [Tag::Users]);
read_def!(GET_ALL_USERS, "getAllUsers", "users/all/", [Tag::Users]);
read_def!(GET_USER, "getUser", "users/{id}/", [Tag::Users]);
write_def!(ADD_USER, "addUser", Post, "users/", [Tag::Users]);
write_def!(PATCH_USER, "patchUser", Patch, "users/{id}/", [Tag::Users]);
write_def!(REMOVE_USER, "removeUser", Delete, "users/{id}/", [Tag::Users]);

read_def!(GET_COMPANY_PROFILE, "getCompanyProfile", "profiles/company/", [Tag::CompanyProfile]);
write_def!(PATCH_COMPANY_PROFILE, "patchCompanyProfile", Patch, "profiles/company/",
    [Tag::CompanyProfile]);
read_def!(GET_MY_PROFILE, "getMyProfile", "profiles/me/", [Tag::UserProfile]);
write_def!(PATCH_MY_PROFILE, "patchMyProfile", Patch, "profiles/me/", [Tag::UserProfile]);
write_def!(CHANGE_PASSWORD, "changePassword", Post, "users/{id}/password/", []);

/// Every cache-facing endpoint, for the completeness test and for
/// tooling that wants the whole surface.
pub const ALL_ENDPOINTS: &[&EndpointDef] = &[
    &GET_ORDERS, &GET_ORDER, &GET_ORIGIN_ITEMS, &GET_CALENDAR, &GET_CATEGORIES,
    &GET_ALL_CATEGORIES, &GET_ITEMS, &GET_ITEM, &ADD_ITEM, &PATCH_ITEM, &REMOVE_ITEM,
    &RESET_ITEM_STAGES, &GET_FLOWS, &GET_ALL_FLOWS, &GET_FLOW, &ADD_FLOW, &PATCH_FLOW,
    &REMOVE_FLOW, &GET_STAGES, &GET_ALL_STAGES, &GET_STAGE, &ADD_STAGE, &PATCH_STAGE,
    &REMOVE_STAGE, &GET_CAPACITIES, &GET_CAPACITY, &ADD_CAPACITY, &PATCH_CAPACITY,
    &REMOVE_CAPACITY, &GET_COMMENTS, &GET_COMMENT, &ADD_COMMENT, &PATCH_COMMENT,
    &REMOVE_COMMENT, &GET_SALES_ORDERS, &PATCH_SALES_ORDER, &GET_USERS, &GET_ALL_USERS,
    &GET_USER, &ADD_USER, &PATCH_USER, &REMOVE_USER, &GET_COMPANY_PROFILE,
    &PATCH_COMPANY_PROFILE, &GET_MY_PROFILE, &PATCH_MY_PROFILE, &CHANGE_PASSWORD,
];

// ── Read operations ───────────────────────────────────────────────────

impl SyncClient {
    pub fn orders(&self, params: QueryParams) -> Resource<Page<Order>> {
        self.list(&GET_ORDERS, params)
    }

    pub fn order(&self, id: &str) -> Resource<Order> {
        self.record(&GET_ORDER, id)
    }

    pub fn origin_items(&self, params: QueryParams) -> Resource<Page<OriginItem>> {
        self.list(&GET_ORIGIN_ITEMS, params)
    }

    /// Capacity calendar for one month (`calendar/{year}/{month}/`).
    pub fn calendar(&self, year: i32, month: u32) -> Resource<CalendarMonth> {
        self.record(&GET_CALENDAR, format!("{:04}/{:02}", year, month))
    }

    pub fn categories(&self, params: QueryParams) -> Resource<Page<Category>> {
        self.list(&GET_CATEGORIES, params)
    }

    pub fn all_categories(&self) -> Resource<Vec<Category>> {
        self.list(&GET_ALL_CATEGORIES, QueryParams::new())
    }

    pub fn items(&self, params: QueryParams) -> Resource<Page<Item>> {
        self.list(&GET_ITEMS, params)
    }

    pub fn item(&self, id: i64) -> Resource<Item> {
        self.record(&GET_ITEM, id)
    }

    pub fn flows(&self, params: QueryParams) -> Resource<Page<Flow>> {
        self.list(&GET_FLOWS, params)
    }

    pub fn all_flows(&self) -> Resource<Vec<Flow>> {
        self.list(&GET_ALL_FLOWS, QueryParams::new())
    }

    pub fn flow(&self, id: i64) -> Resource<Flow> {
        self.record(&GET_FLOW, id)
    }

    pub fn stages(&self, params: QueryParams) -> Resource<Page<Stage>> {
        self.list(&GET_STAGES, params)
    }

    pub fn all_stages(&self) -> Resource<Vec<Stage>> {
        self.list(&GET_ALL_STAGES, QueryParams::new())
    }

    pub fn stage(&self, id: i64) -> Resource<Stage> {
        self.record(&GET_STAGE, id)
    }

    pub fn capacities(&self, params: QueryParams) -> Resource<Page<Capacity>> {
        self.list(&GET_CAPACITIES, params)
    }

    pub fn capacity(&self, id: i64) -> Resource<Capacity> {
        self.record(&GET_CAPACITY, id)
    }

    pub fn comments(&self, params: QueryParams) -> Resource<Page<Comment>> {
        self.list(&GET_COMMENTS, params)
    }

    pub fn comment(&self, id: i64) -> Resource<Comment> {
        self.record(&GET_COMMENT, id)
    }

    pub fn sales_orders(&self, params: QueryParams) -> Resource<Page<SalesOrder>> {
        self.list(&GET_SALES_ORDERS, params)
    }

    pub fn users(&self, params: QueryParams) -> Resource<Page<User>> {
        self.list(&GET_USERS, params)
    }

    pub fn all_users(&self) -> Resource<Vec<User>> {
        self.list(&GET_ALL_USERS, QueryParams::new())
    }

    pub fn user(&self, id: i64) -> Resource<User> {
        self.record(&GET_USER, id)
    }

    pub fn company_profile(&self) -> Resource<crate::models::CompanyProfile> {
        self.bare(&GET_COMPANY_PROFILE)
    }

    pub fn my_profile(&self) -> Resource<crate::models::UserProfile> {
        self.bare(&GET_MY_PROFILE)
    }

    fn list<T: serde::de::DeserializeOwned>(
        &self,
        def: &'static EndpointDef,
        params: QueryParams,
    ) -> Resource<T> {
        let key = CacheKey::list(def.name, &params);
        self.query(def, key, def.path.to_string(), Some(params))
    }

    fn record<T: serde::de::DeserializeOwned>(
        &self,
        def: &'static EndpointDef,
        id: impl std::fmt::Display,
    ) -> Resource<T> {
        let key = CacheKey::record(def.name, &id);
        self.query(def, key, def.path_with(id), None)
    }

    fn bare<T: serde::de::DeserializeOwned>(&self, def: &'static EndpointDef) -> Resource<T> {
        self.query(def, CacheKey::bare(def.name), def.path.to_string(), None)
    }
}

// ── Write operations ──────────────────────────────────────────────────

impl SyncClient {
    /// Schedule production for an order line. When the origin-items view
    /// the user is looking at is passed in, the new item appears there
    /// immediately under a provisional id; the reconciling refetch swaps
    /// in the server row.
    pub async fn add_item(
        &self,
        draft: ItemDraft,
        visible: Option<&QueryParams>,
    ) -> Result<Item, ApiError> {
        let mut command = MutationCommand::new();
        if let Some(params) = visible {
            let key = CacheKey::list(GET_ORIGIN_ITEMS.name, params);
            let origin_id = draft.origin_item.clone();
            let speculative = json!({
                "id": provisional_id(),
                "origin_item": origin_id.clone(),
                "flow": draft.flow.map(|id| json!({"id": id, "name": "", "stages": []})),
                "stage": null,
                "production_date": draft.production_date,
                "priority": draft.priority.unwrap_or(0),
                "packages": draft.packages.unwrap_or(0),
                "location": draft.location.unwrap_or(0),
                "time": draft.time.clone(),
                "comments": [],
            });
            command.record(self.cache().apply_optimistic(&key, move |value| {
                if let Some(rows) = value.get_mut("results").and_then(Value::as_array_mut) {
                    for row in rows {
                        if row.get("id") == Some(&json!(origin_id)) {
                            row["item"] = speculative.clone();
                        }
                    }
                }
            }));
        }
        let body = self
            .run_mutation(&ADD_ITEM, ADD_ITEM.path.to_string(), Some(json!(draft)), command)
            .await?;
        serde_json::from_value(body).map_err(ApiError::Decode)
    }

    /// Patch a scheduled item. Assigning a new flow optimistically
    /// clears the stage — staging restarts inside the new flow.
    pub async fn patch_item(
        &self,
        id: i64,
        patch: ItemPatch,
        visible: Option<&QueryParams>,
    ) -> Result<(), ApiError> {
        let mut command = MutationCommand::new();
        if let Some(params) = visible {
            let key = CacheKey::list(GET_ORIGIN_ITEMS.name, params);
            let overlay = patch.clone();
            command.record(self.cache().apply_optimistic(&key, move |value| {
                let Some(rows) = value.get_mut("results").and_then(Value::as_array_mut) else {
                    return;
                };
                for row in rows {
                    let Some(item) = row.get_mut("item").filter(|i| !i.is_null()) else {
                        continue;
                    };
                    if item.get("id") != Some(&json!(id)) {
                        continue;
                    }
                    apply_item_patch(item, &overlay);
                }
            }));
        }
        self.run_mutation(&PATCH_ITEM, PATCH_ITEM.path_with(id), Some(json!(patch)), command)
            .await?;
        Ok(())
    }

    pub async fn remove_item(&self, id: i64) -> Result<(), ApiError> {
        self.run_mutation(
            &REMOVE_ITEM,
            REMOVE_ITEM.path_with(id),
            None,
            MutationCommand::new(),
        )
        .await?;
        Ok(())
    }

    /// Send an item back to the start of its flow.
    pub async fn reset_item_stages(&self, id: i64) -> Result<(), ApiError> {
        self.run_mutation(
            &RESET_ITEM_STAGES,
            RESET_ITEM_STAGES.path_with(id),
            None,
            MutationCommand::new(),
        )
        .await?;
        Ok(())
    }

    pub async fn add_flow(&self, draft: FlowDraft) -> Result<Flow, ApiError> {
        let body = self
            .run_mutation(
                &ADD_FLOW,
                ADD_FLOW.path.to_string(),
                Some(json!(draft)),
                MutationCommand::new(),
            )
            .await?;
        serde_json::from_value(body).map_err(ApiError::Decode)
    }

    pub async fn patch_flow(&self, id: i64, patch: FlowPatch) -> Result<(), ApiError> {
        self.run_mutation(&PATCH_FLOW, PATCH_FLOW.path_with(id), Some(json!(patch)), MutationCommand::new())
            .await?;
        Ok(())
    }

    pub async fn remove_flow(&self, id: i64) -> Result<(), ApiError> {
        self.run_mutation(&REMOVE_FLOW, REMOVE_FLOW.path_with(id), None, MutationCommand::new())
            .await?;
        Ok(())
    }

    pub async fn add_stage(&self, draft: StageDraft) -> Result<Stage, ApiError> {
        let body = self
            .run_mutation(
                &ADD_STAGE,
                ADD_STAGE.path.to_string(),
                Some(json!(draft)),
                MutationCommand::new(),
            )
            .await?;
        serde_json::from_value(body).map_err(ApiError::Decode)
    }

    /// Patch a stage. A position change with the visible board passed in
    /// reorders the cards optimistically; a failed request snaps them
    /// back.
    pub async fn patch_stage(
        &self,
        id: i64,
        patch: StagePatch,
        visible: Option<&QueryParams>,
    ) -> Result<(), ApiError> {
        let mut command = MutationCommand::new();
        if let (Some(params), Some(new_position)) = (visible, patch.position) {
            let key = CacheKey::list(GET_STAGES.name, params);
            command.record(self.cache().apply_optimistic(&key, move |value| {
                if let Some(rows) = value.get_mut("results").and_then(Value::as_array_mut) {
                    reposition_stage(rows, id, new_position);
                }
            }));
        }
        self.run_mutation(&PATCH_STAGE, PATCH_STAGE.path_with(id), Some(json!(patch)), command)
            .await?;
        Ok(())
    }

    pub async fn remove_stage(&self, id: i64) -> Result<(), ApiError> {
        self.run_mutation(&REMOVE_STAGE, REMOVE_STAGE.path_with(id), None, MutationCommand::new())
            .await?;
        Ok(())
    }

    /// Add a capacity row. With the visible list passed in, the row
    /// shows up immediately under a provisional id.
    pub async fn add_capacity(
        &self,
        draft: CapacityDraft,
        visible: Option<&QueryParams>,
    ) -> Result<Capacity, ApiError> {
        let mut command = MutationCommand::new();
        if let Some(params) = visible {
            let key = CacheKey::list(GET_CAPACITIES.name, params);
            let row = json!({
                "id": provisional_id(),
                "category": draft.category,
                "per_day": draft.per_day,
            });
            command.record(self.cache().apply_optimistic(&key, move |value| {
                if let Some(rows) = value.get_mut("results").and_then(Value::as_array_mut) {
                    rows.push(row.clone());
                }
                if let Some(count) = value.get("count").and_then(Value::as_i64) {
                    value["count"] = json!(count + 1);
                }
            }));
        }
        let body = self
            .run_mutation(
                &ADD_CAPACITY,
                ADD_CAPACITY.path.to_string(),
                Some(json!(draft)),
                command,
            )
            .await?;
        serde_json::from_value(body).map_err(ApiError::Decode)
    }

    pub async fn patch_capacity(
        &self,
        id: i64,
        patch: CapacityPatch,
        visible: Option<&QueryParams>,
    ) -> Result<(), ApiError> {
        let mut command = MutationCommand::new();
        if let Some(params) = visible {
            let key = CacheKey::list(GET_CAPACITIES.name, params);
            let overlay = patch.clone();
            command.record(self.cache().apply_optimistic(&key, move |value| {
                let Some(rows) = value.get_mut("results").and_then(Value::as_array_mut) else {
                    return;
                };
                for row in rows {
                    if row.get("id") != Some(&json!(id)) {
                        continue;
                    }
                    if let Some(category) = overlay.category {
                        row["category"] = json!(category);
                    }
                    if let Some(per_day) = overlay.per_day {
                        row["per_day"] = json!(per_day);
                    }
                }
            }));
        }
        self.run_mutation(&PATCH_CAPACITY, PATCH_CAPACITY.path_with(id), Some(json!(patch)), command)
            .await?;
        Ok(())
    }

    pub async fn remove_capacity(&self, id: i64) -> Result<(), ApiError> {
        self.run_mutation(&REMOVE_CAPACITY, REMOVE_CAPACITY.path_with(id), None, MutationCommand::new())
            .await?;
        Ok(())
    }

    pub async fn add_comment(&self, draft: CommentDraft) -> Result<Comment, ApiError> {
        let body = self
            .run_mutation(
                &ADD_COMMENT,
                ADD_COMMENT.path.to_string(),
                Some(json!(draft)),
                MutationCommand::new(),
            )
            .await?;
        serde_json::from_value(body).map_err(ApiError::Decode)
    }

    pub async fn patch_comment(&self, id: i64, text: &str) -> Result<(), ApiError> {
        self.run_mutation(
            &PATCH_COMMENT,
            PATCH_COMMENT.path_with(id),
            Some(json!({ "text": text })),
            MutationCommand::new(),
        )
        .await?;
        Ok(())
    }

    pub async fn remove_comment(&self, id: i64) -> Result<(), ApiError> {
        self.run_mutation(&REMOVE_COMMENT, REMOVE_COMMENT.path_with(id), None, MutationCommand::new())
            .await?;
        Ok(())
    }

    pub async fn patch_sales_order(&self, id: i64, patch: SalesOrderPatch) -> Result<(), ApiError> {
        self.run_mutation(
            &PATCH_SALES_ORDER,
            PATCH_SALES_ORDER.path_with(id),
            Some(json!(patch)),
            MutationCommand::new(),
        )
        .await?;
        Ok(())
    }

    pub async fn add_user(&self, draft: UserDraft) -> Result<User, ApiError> {
        let body = self
            .run_mutation(
                &ADD_USER,
                ADD_USER.path.to_string(),
                Some(json!(draft)),
                MutationCommand::new(),
            )
            .await?;
        serde_json::from_value(body).map_err(ApiError::Decode)
    }

    pub async fn patch_user(&self, id: i64, patch: UserPatch) -> Result<(), ApiError> {
        self.run_mutation(&PATCH_USER, PATCH_USER.path_with(id), Some(json!(patch)), MutationCommand::new())
            .await?;
        Ok(())
    }

    pub async fn remove_user(&self, id: i64) -> Result<(), ApiError> {
        self.run_mutation(&REMOVE_USER, REMOVE_USER.path_with(id), None, MutationCommand::new())
            .await?;
        Ok(())
    }

    pub async fn patch_company_profile(&self, patch: Value) -> Result<(), ApiError> {
        self.run_mutation(
            &PATCH_COMPANY_PROFILE,
            PATCH_COMPANY_PROFILE.path.to_string(),
            Some(patch),
            MutationCommand::new(),
        )
        .await?;
        Ok(())
    }

    pub async fn patch_my_profile(&self, patch: Value) -> Result<(), ApiError> {
        self.run_mutation(
            &PATCH_MY_PROFILE,
            PATCH_MY_PROFILE.path.to_string(),
            Some(patch),
            MutationCommand::new(),
        )
        .await?;
        Ok(())
    }

    pub async fn change_password(&self, user_id: i64, change: PasswordChange) -> Result<(), ApiError> {
        self.run_mutation(
            &CHANGE_PASSWORD,
            CHANGE_PASSWORD.path_with(user_id),
            Some(json!(change)),
            MutationCommand::new(),
        )
        .await?;
        Ok(())
    }
}

// ── Optimistic mutators ───────────────────────────────────────────────

/// Field-apply an [`ItemPatch`] to a cached item object. A flow change
/// resets the stage: staging restarts inside the new flow.
fn apply_item_patch(item: &mut Value, patch: &ItemPatch) {
    let ItemPatch {
        flow,
        stage,
        priority,
        packages,
        location,
        time,
        production_date,
    } = patch;
    if let Some(flow) = flow {
        item["flow"] = json!({"id": flow, "name": "", "stages": []});
        item["stage"] = Value::Null;
    }
    if let Some(stage) = stage {
        item["stage"] = json!({"id": stage, "name": "", "color": ""});
    }
    if let Some(priority) = priority {
        item["priority"] = json!(priority);
    }
    if let Some(packages) = packages {
        item["packages"] = json!(packages);
    }
    if let Some(location) = location {
        item["location"] = json!(location);
    }
    if let Some(time) = time {
        item["time"] = json!(time);
    }
    if let Some(production_date) = production_date {
        item["production_date"] = json!(production_date);
    }
}

/// Move one stage card to `new_position`, shifting the cards between its
/// old and new slot by one.
fn reposition_stage(rows: &mut [Value], id: i64, new_position: i64) {
    let Some(old_position) = rows
        .iter()
        .find(|r| r.get("id") == Some(&json!(id)))
        .and_then(|r| r.get("position"))
        .and_then(Value::as_i64)
    else {
        return;
    };
    for row in rows {
        let Some(position) = row.get("position").and_then(Value::as_i64) else {
            continue;
        };
        if row.get("id") == Some(&json!(id)) {
            row["position"] = json!(new_position);
        } else if old_position < new_position
            && position > old_position
            && position <= new_position
        {
            row["position"] = json!(position - 1);
        } else if old_position > new_position
            && position >= new_position
            && position < old_position
        {
            row["position"] = json!(position + 1);
        }
    }
}
