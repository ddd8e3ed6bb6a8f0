use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

// Floor, shop, and podium descriptors plus everything trailing them. The
// lookup service matches at street and building granularity, so anything
// below that only dilutes the query.
static RE_FLOOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9A-z\s\-]+[樓層]|[0-9A-z號\s\-]+[舖鋪]|地[下庫]|平台).*")
        .expect("invalid RE_FLOOR")
});

/// Truncates an address at the first floor-level descriptor, leaving the
/// building-level part intact.
pub fn strip_floor(address: &str) -> Cow<'_, str> {
    RE_FLOOR.replace_all(address, "")
}
