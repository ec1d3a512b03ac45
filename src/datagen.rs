//! Synthetic data generators for the simulator and the demo seeding
//! endpoints.
//!
//! Named generators produce request payloads and path parameters; the
//! names are referenced from the simulation config (`payload = "add_to_cart"`,
//! `path_param = "product_id"`). Identities, addresses, and product copy
//! come from small word lists driven by `rand`, enough variety to make
//! the analytics dashboards look alive.

use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};
use std::net::Ipv4Addr;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Edge/91.0.864.59",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 14_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Android 11; Mobile; rv:68.0) Gecko/68.0 Firefox/88.0",
];

const FIRST_NAMES: &[&str] = &[
    "Alice", "Bruno", "Carmen", "Dmitri", "Elena", "Farid", "Grace", "Hiro", "Ingrid", "Jamal",
    "Kira", "Liam", "Maya", "Noel", "Olga", "Pedro", "Quinn", "Rosa", "Sven", "Tara",
];

const LAST_NAMES: &[&str] = &[
    "Anders", "Brook", "Costa", "Drake", "Egan", "Fonseca", "Grimm", "Haines", "Ito", "Jensen",
    "Kovacs", "Lindqvist", "Moreau", "Novak", "Okafor", "Perez", "Quist", "Rousseau", "Silva",
    "Tanaka",
];

const PRODUCT_ADJECTIVES: &[&str] = &[
    "Portable", "Wireless", "Organic", "Compact", "Premium", "Rugged", "Foldable", "Smart",
    "Classic", "Lightweight",
];

const PRODUCT_NOUNS: &[&str] = &[
    "Speaker", "Backpack", "Notebook", "Lamp", "Kettle", "Tripod", "Keyboard", "Blender",
    "Monitor", "Jacket",
];

const STREETS: &[&str] = &[
    "Maple Street", "Oak Avenue", "Cedar Lane", "Elm Drive", "Birch Road", "Willow Way",
    "Harbor Boulevard", "Sunset Terrace",
];

const CITIES: &[&str] = &[
    "Springfield", "Riverton", "Lakewood", "Fairview", "Ashland", "Brookhaven", "Milton",
    "Clayton",
];

/// Product ids the seed migration guarantees to exist. Generators that
/// reference products stay inside this range so simulated traffic mostly
/// hits live rows.
pub const SEEDED_PRODUCT_IDS: std::ops::RangeInclusive<i64> = 1..=10;

/// A realistic browser user agent.
pub fn user_agent() -> &'static str {
    USER_AGENTS.choose(&mut rand::thread_rng()).unwrap()
}

/// Random username like `kira_perez417`.
pub fn username() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{}_{}{}",
        FIRST_NAMES.choose(&mut rng).unwrap().to_lowercase(),
        LAST_NAMES.choose(&mut rng).unwrap().to_lowercase(),
        rng.gen_range(100..1000)
    )
}

pub fn email(username: &str) -> String {
    let domains = ["example.com", "example.org", "mail.test"];
    format!(
        "{username}@{}",
        domains.choose(&mut rand::thread_rng()).unwrap()
    )
}

pub fn first_name() -> &'static str {
    FIRST_NAMES.choose(&mut rand::thread_rng()).unwrap()
}

pub fn last_name() -> &'static str {
    LAST_NAMES.choose(&mut rand::thread_rng()).unwrap()
}

/// Product name like `Compact Kettle`.
pub fn product_name() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{} {}",
        PRODUCT_ADJECTIVES.choose(&mut rng).unwrap(),
        PRODUCT_NOUNS.choose(&mut rng).unwrap()
    )
}

pub fn sku() -> String {
    format!("SKU{}", rand::thread_rng().gen_range(10_000..100_000))
}

/// Street address like `742 Oak Avenue, Riverton`.
pub fn street_address() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "{} {}, {}",
        rng.gen_range(1..1000),
        STREETS.choose(&mut rng).unwrap(),
        CITIES.choose(&mut rng).unwrap()
    )
}

/// Price with two decimal places in 9.99..=999.99.
pub fn price() -> f64 {
    let cents = rand::thread_rng().gen_range(999..100_000);
    cents as f64 / 100.0
}

/// Random host address inside one of the given IPv4 CIDR blocks; falls
/// back to a fully random address when no ranges are configured or none
/// parse.
pub fn ip_in_ranges(ranges: &[String]) -> Ipv4Addr {
    let mut rng = rand::thread_rng();
    if let Some(range) = ranges.choose(&mut rng) {
        if let Some(ip) = ip_in_cidr(range) {
            return ip;
        }
    }
    Ipv4Addr::from(rng.gen::<u32>())
}

/// Uniformly pick a host address inside `a.b.c.d/len`, excluding the
/// network and broadcast addresses where the block is big enough to
/// have them.
fn ip_in_cidr(cidr: &str) -> Option<Ipv4Addr> {
    let (addr, len) = cidr.split_once('/')?;
    let base: Ipv4Addr = addr.parse().ok()?;
    let len: u32 = len.parse().ok()?;
    if len > 32 {
        return None;
    }

    let host_bits = 32 - len;
    let network = if host_bits == 32 {
        0
    } else {
        u32::from(base) & (u32::MAX << host_bits)
    };

    let mut rng = rand::thread_rng();
    let offset = match host_bits {
        0 => 0,
        1 => rng.gen_range(0..2u32),
        _ => rng.gen_range(1..(1u64 << host_bits) - 1) as u32,
    };

    Some(Ipv4Addr::from(network | offset))
}

// ---------------------------------------------------------------------------
// Named generators
// ---------------------------------------------------------------------------

/// Resolve a named payload generator. Unknown names yield an empty
/// object so a config typo degrades to harmless traffic.
pub fn payload(name: &str) -> Value {
    let mut rng = rand::thread_rng();
    match name {
        "create_user" => {
            let username = username();
            json!({
                "username": username,
                "email": email(&username),
                "first_name": first_name(),
                "last_name": last_name(),
            })
        }
        "create_product" => json!({
            "name": product_name(),
            "description": format!("{} for the demo catalog", product_name()),
            "price": price(),
            "category_id": rng.gen_range(1..=5),
            "stock_quantity": rng.gen_range(0..=500),
            "sku": sku(),
        }),
        "add_to_cart" => json!({
            "product_id": rng.gen_range(SEEDED_PRODUCT_IDS),
            "quantity": rng.gen_range(1..=3),
        }),
        "update_cart_item" => json!({
            "quantity": rng.gen_range(1..=5),
        }),
        "checkout" => json!({
            "shipping_address": street_address(),
        }),
        _ => json!({}),
    }
}

/// Resolve a named path-parameter generator. Unknown names yield `"1"`.
pub fn path_param(name: &str) -> String {
    let mut rng = rand::thread_rng();
    match name {
        "product_id" => rng.gen_range(SEEDED_PRODUCT_IDS).to_string(),
        "cart_item_id" => rng.gen_range(1..=50).to_string(),
        "order_id" => rng.gen_range(1..=100).to_string(),
        _ => "1".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
