//! Simulated user sessions.
//!
//! A session pins together the identity one synthetic visitor presents to
//! the APIs: a session id, a stable user id, a source IP drawn from the
//! session's region, and a browser user agent. Request budget and think
//! time come from the user type the session was spawned as.

use std::net::Ipv4Addr;
use std::time::Duration;

use rand::Rng;
use uuid::Uuid;

use crate::config::{RegionConfig, UserTypeConfig};
use crate::datagen;

pub struct UserSession {
    pub session_id: String,
    pub user_id: String,
    pub user_type: String,
    pub region: String,
    pub ip_address: Ipv4Addr,
    pub user_agent: &'static str,
    think_time_secs: [f64; 2],
    requests_made: u32,
    request_budget: u32,
}

impl UserSession {
    pub fn new(user_type: &UserTypeConfig, region: &RegionConfig) -> Self {
        let mut rng = rand::thread_rng();
        let [min, max] = user_type.requests_per_session;
        Self {
            session_id: Uuid::new_v4().to_string(),
            user_id: format!("user_{:04}", rng.gen_range(0..1000)),
            user_type: user_type.name.clone(),
            region: region.name.clone(),
            ip_address: datagen::ip_in_ranges(&region.ip_ranges),
            user_agent: datagen::user_agent(),
            think_time_secs: user_type.think_time_secs,
            requests_made: 0,
            request_budget: rng.gen_range(min..=max),
        }
    }

    pub fn should_continue(&self) -> bool {
        self.requests_made < self.request_budget
    }

    pub fn record_request(&mut self) {
        self.requests_made += 1;
    }

    pub fn requests_made(&self) -> u32 {
        self.requests_made
    }

    /// Pause between requests within this session.
    pub fn think_time(&self) -> Duration {
        let [min, max] = self.think_time_secs;
        let secs = if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };
        Duration::from_secs_f64(secs)
    }

    /// Headers every request from this session carries. The APIs read these
    /// back in the metrics middleware to attribute traffic.
    pub fn headers(&self) -> [(&'static str, String); 4] {
        [
            ("User-Agent", self.user_agent.to_string()),
            ("X-Session-ID", self.session_id.clone()),
            ("X-User-ID", self.user_id.clone()),
            ("X-Forwarded-For", self.ip_address.to_string()),
        ]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn browser() -> UserTypeConfig {
        UserTypeConfig {
            name: "browser".into(),
            weight: 1.0,
            requests_per_session: [3, 8],
            think_time_secs: [0.5, 2.0],
        }
    }

    fn us_east() -> RegionConfig {
        RegionConfig {
            name: "US-East".into(),
            weight: 1.0,
            ip_ranges: vec!["10.0.0.0/16".into()],
        }
    }

    #[test]
    fn session_budget_is_honored() {
        let mut session = UserSession::new(&browser(), &us_east());
        let mut made = 0;
        while session.should_continue() {
            session.record_request();
            made += 1;
        }
        assert!((3..=8).contains(&made));
        assert_eq!(session.requests_made(), made);
    }

    #[test]
    fn think_time_within_configured_range() {
        let session = UserSession::new(&browser(), &us_east());
        for _ in 0..50 {
            let t = session.think_time().as_secs_f64();
            assert!((0.5..=2.0).contains(&t));
        }
    }

    #[test]
    fn ip_drawn_from_region_range() {
        let session = UserSession::new(&browser(), &us_east());
        assert_eq!(session.ip_address.octets()[0], 10);
        assert_eq!(session.ip_address.octets()[1], 0);
    }

    #[test]
    fn headers_cover_identity() {
        let session = UserSession::new(&browser(), &us_east());
        let headers = session.headers();
        assert_eq!(headers[1].0, "X-Session-ID");
        assert_eq!(headers[1].1, session.session_id);
        assert!(headers[2].1.starts_with("user_"));
    }
}
