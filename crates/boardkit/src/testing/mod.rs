//! Testing infrastructure for controllers
//!
//! Key components:
//! - `FakeBackend`: in-memory page source, mutation target and change feed
//! - `sample_orders`: deterministic order fixtures for tests and demos

pub mod fake_backend;

pub use fake_backend::{FakeBackend, Gate, PagingMode};

use chrono::{Duration, NaiveDate};

use crate::orders::{Member, Order, Tag};

const STATUSES: [&str; 4] = ["pending", "in_progress", "in_review", "completed"];
const PRIORITIES: [&str; 3] = ["low", "medium", "high"];

/// `n` orders with ids `"1"..="n"`, cycling through statuses, priorities,
/// assignees and clients. Due dates start on 2024-05-01, one per day.
pub fn sample_orders(n: usize) -> Vec<Order> {
    let first_due = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap_or_default();
    let members = [
        member("m-1", "Ada Lovelace", "ada@agency.test"),
        member("m-2", "Grace Hopper", "grace@agency.test"),
        member("m-3", "Alan Turing", "alan@agency.test"),
    ];
    let clients = [
        member("org-a", "Acme", "hello@acme.test"),
        member("org-b", "Globex", "hello@globex.test"),
    ];

    (1..=n)
        .map(|i| {
            let mut order = Order::new(i.to_string(), format!("Order #{}", i));
            let status = STATUSES[i % STATUSES.len()];
            order.status = Some(status.to_string());
            order.status_id = Some((i % STATUSES.len()) as i64 + 1);
            order.priority = Some(PRIORITIES[i % PRIORITIES.len()].to_string());
            order.position = Some(i as i64);
            order.due_date = Some((first_due + Duration::days(i as i64 - 1)).to_string());
            order.created_at = Some(format!("2024-04-{:02}T09:00:00Z", (i % 28) + 1));
            order.assigned_to = vec![members[i % members.len()].clone()];
            order.client_organization = Some(clients[i % clients.len()].clone());
            if i % 5 == 0 {
                order.tags = vec![Tag {
                    id: "t-urgent".to_string(),
                    name: "urgent".to_string(),
                    color: Some("#e11d48".to_string()),
                }];
            }
            order
        })
        .collect()
}

fn member(id: &str, name: &str, email: &str) -> Member {
    Member {
        id: id.to_string(),
        name: name.to_string(),
        email: Some(email.to_string()),
        picture_url: None,
    }
}
