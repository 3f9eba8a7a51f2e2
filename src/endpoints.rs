use reqwest::header::HeaderName;
use std::str::FromStr;
use std::sync::OnceLock;

pub const API_V1_WS: &str = "/api/v1/ws";
pub const API_V1_FEEDS: &str = "/api/v1/feeds";
pub const API_V1_REPORTS_LATEST: &str = "/api/v1/reports/latest";
pub const API_V1_REPORTS_BULK: &str = "/api/v1/reports/bulk";
pub const API_V1_REPORTS_PAGE: &str = "/api/v1/reports/page";

static AVAIL_ORIGINS_HEADER: OnceLock<HeaderName> = OnceLock::new();
static ORIGIN_HEADER: OnceLock<HeaderName> = OnceLock::new();
static AUTHZ_HEADER: OnceLock<HeaderName> = OnceLock::new();
static AUTHZ_TS_HEADER: OnceLock<HeaderName> = OnceLock::new();
static AUTHZ_SIG_HEADER: OnceLock<HeaderName> = OnceLock::new();
static HOST_HEADER: OnceLock<HeaderName> = OnceLock::new();

/// "X-Cll-Available-Origins"
pub fn avail_origins_header() -> &'static HeaderName {
    AVAIL_ORIGINS_HEADER.get_or_init(|| {
        HeaderName::from_str("X-Cll-Available-Origins")
            .expect("invalid header name: X-Cll-Available-Origins")
    })
}

/// "X-Cll-Origin"
pub fn origin_header() -> &'static HeaderName {
    ORIGIN_HEADER.get_or_init(|| {
        HeaderName::from_str("X-Cll-Origin").expect("invalid header name: X-Cll-Origin")
    })
}

/// "Authorization"
pub fn authz_header() -> &'static HeaderName {
    AUTHZ_HEADER.get_or_init(|| {
        HeaderName::from_str("Authorization").expect("invalid header name: Authorization")
    })
}

/// "X-Authorization-Timestamp"
pub fn authz_ts_header() -> &'static HeaderName {
    AUTHZ_TS_HEADER.get_or_init(|| {
        HeaderName::from_str("X-Authorization-Timestamp")
            .expect("invalid header name: X-Authorization-Timestamp")
    })
}

/// "X-Authorization-Signature-SHA256"
pub fn authz_sig_header() -> &'static HeaderName {
    AUTHZ_SIG_HEADER.get_or_init(|| {
        HeaderName::from_str("X-Authorization-Signature-SHA256")
            .expect("invalid header name: X-Authorization-Signature-SHA256")
    })
}

/// "Host"
pub fn host_header() -> &'static HeaderName {
    HOST_HEADER.get_or_init(|| HeaderName::from_str("Host").expect("invalid header name: Host"))
}
