//! `shopfloor list <resource>` — one page through the cache layer.

use std::sync::Arc;

use anyhow::{Result, bail};
use console::style;

use shopfloor::SyncClient;
use shopfloor::cache::QueryParams;
use shopfloor::config::ShopfloorConfig;
use shopfloor::models::Page;
use shopfloor::storage::CredentialStore;

const RESOURCES: &[&str] = &[
    "orders",
    "origin-items",
    "items",
    "flows",
    "stages",
    "capacities",
    "categories",
    "comments",
    "sales-orders",
    "users",
];

pub async fn cmd_list(
    config: &ShopfloorConfig,
    resource: &str,
    offset: u64,
    limit: u64,
    search: Option<String>,
    ordering: Option<String>,
) -> Result<()> {
    if !RESOURCES.contains(&resource) {
        bail!(
            "Unknown resource '{}'. Try one of: {}.",
            resource,
            RESOURCES.join(", ")
        );
    }
    let store = Arc::new(CredentialStore::open_default()?);
    let client = SyncClient::new(config, store)?;

    let mut params = QueryParams::new().offset(offset).limit(limit);
    if let Some(search) = search {
        params = params.search(search);
    }
    if let Some(ordering) = ordering {
        params = params.ordering(ordering);
    }

    match resource {
        "orders" => {
            let page = client.orders(params).settled().await?;
            print_header(&page);
            for order in &page.results {
                println!(
                    "  {}  {}  {} item(s)  {}",
                    style(&order.id).bold(),
                    order.customer,
                    order.count_items,
                    if order.completed { "completed" } else { "open" }
                );
            }
        }
        "origin-items" => {
            let page = client.origin_items(params).settled().await?;
            print_header(&page);
            for origin in &page.results {
                let scheduled = match &origin.item {
                    Some(item) => match (&item.flow, &item.stage) {
                        (Some(flow), Some(stage)) => format!("{} / {}", flow.name, stage.name),
                        (Some(flow), None) => format!("{} / unstaged", flow.name),
                        _ => "scheduled".to_string(),
                    },
                    None => "unscheduled".to_string(),
                };
                println!("  {}  {}  {}", style(&origin.id).bold(), origin.description, scheduled);
            }
        }
        "items" => {
            let page = client.items(params).settled().await?;
            print_header(&page);
            for item in &page.results {
                println!(
                    "  #{}  priority {}  {}",
                    style(item.id).bold(),
                    item.priority,
                    item.production_date
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
        }
        "flows" => {
            let page = client.flows(params).settled().await?;
            print_header(&page);
            for flow in &page.results {
                println!(
                    "  #{}  {}  {} stage(s)",
                    style(flow.id).bold(),
                    flow.name,
                    flow.stages.len()
                );
            }
        }
        "stages" => {
            let page = client.stages(params).settled().await?;
            print_header(&page);
            for stage in &page.results {
                println!(
                    "  #{}  {}  position {}  flow {}",
                    style(stage.id).bold(),
                    stage.name,
                    stage.position,
                    stage.flow
                );
            }
        }
        "capacities" => {
            let page = client.capacities(params).settled().await?;
            print_header(&page);
            for capacity in &page.results {
                println!(
                    "  #{}  category {}  {}/day",
                    style(capacity.id).bold(),
                    capacity.category,
                    capacity.per_day
                );
            }
        }
        "categories" => {
            let page = client.categories(params).settled().await?;
            print_header(&page);
            for category in &page.results {
                println!(
                    "  #{}  {}  capacity {}",
                    style(category.id).bold(),
                    category.name,
                    category
                        .capacity
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
        }
        "comments" => {
            let page = client.comments(params).settled().await?;
            print_header(&page);
            for comment in &page.results {
                println!(
                    "  #{}  {} {}: {}",
                    style(comment.id).bold(),
                    comment.user.first_name,
                    comment.user.last_name,
                    comment.text
                );
            }
        }
        "sales-orders" => {
            let page = client.sales_orders(params).settled().await?;
            print_header(&page);
            for sales_order in &page.results {
                println!(
                    "  #{}  order {}  priority {}",
                    style(sales_order.id).bold(),
                    sales_order.order,
                    sales_order.priority
                );
            }
        }
        "users" => {
            let page = client.users(params).settled().await?;
            print_header(&page);
            for user in &page.results {
                println!(
                    "  #{}  {} {}  {}  ({})",
                    style(user.id).bold(),
                    user.first_name,
                    user.last_name,
                    user.email,
                    user.role
                );
            }
        }
        // Guarded by the RESOURCES check above.
        other => bail!("Unknown resource '{}'", other),
    }
    Ok(())
}

fn print_header<T>(page: &Page<T>) {
    println!(
        "{} of {} row(s){}",
        page.results.len(),
        page.count,
        if page.next.is_some() { ", more available" } else { "" }
    );
}
