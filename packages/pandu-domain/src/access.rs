/// Content tiers ordered from least to most restricted. Access level N may
/// read the first N + 1 tiers.
pub const TIERS: [&str; 4] = ["public", "registered", "professional", "internal"];

pub const MAX_ACCESS_LEVEL: u8 = 3;
pub const STATUS_REPEALED: &str = "repealed";

pub fn allowed_tiers(level: u8) -> &'static [&'static str] {
	let level = level.min(MAX_ACCESS_LEVEL) as usize;

	&TIERS[..=level]
}

/// Backend-neutral visibility predicate. Translated into a vector-store
/// payload filter and re-applied to fused results.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TierPredicate {
	pub allowed_tiers: Vec<String>,
	pub exclude_repealed: bool,
}
impl TierPredicate {
	pub fn matches(&self, tier: &str, status: &str) -> bool {
		if self.exclude_repealed && status.eq_ignore_ascii_case(STATUS_REPEALED) {
			return false;
		}

		self.allowed_tiers.iter().any(|allowed| allowed.eq_ignore_ascii_case(tier))
	}
}

/// Builds the predicate for an access level. A caller-supplied tier filter
/// only narrows the allowed set; it can never widen it beyond the level's
/// ceiling. An empty intersection admits nothing.
pub fn build_predicate(
	level: u8,
	tier_filter: Option<&[String]>,
	include_repealed: bool,
) -> TierPredicate {
	let ceiling = allowed_tiers(level);
	let allowed_tiers = match tier_filter {
		Some(requested) => ceiling
			.iter()
			.filter(|tier| requested.iter().any(|req| req.trim().eq_ignore_ascii_case(tier)))
			.map(|tier| tier.to_string())
			.collect(),
		None => ceiling.iter().map(|tier| tier.to_string()).collect(),
	};

	TierPredicate { allowed_tiers, exclude_repealed: !include_repealed }
}
