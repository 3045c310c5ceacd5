use std::collections::{HashMap, HashSet};

/// Which collections a query should be searched against. `pinned` is set when
/// an explicit hint or override bypassed scoring.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RouteDecision {
	pub collections: Vec<String>,
	pub confidence: f32,
	pub domain_scores: HashMap<String, f32>,
	pub pinned: bool,
}
impl RouteDecision {
	pub fn pinned(collection: impl Into<String>) -> Self {
		Self {
			collections: vec![collection.into()],
			confidence: 1.0,
			domain_scores: HashMap::new(),
			pinned: true,
		}
	}
}

#[derive(Debug, Clone)]
struct CollectionProfile {
	name: String,
	domain: String,
	keywords: HashSet<String>,
}

/// Deterministic, side-effect-free query classifier. Downstream caching
/// depends on identical inputs producing identical decisions.
#[derive(Debug, Clone)]
pub struct QueryRouter {
	profiles: Vec<CollectionProfile>,
	confidence_floor: f32,
	fallback: String,
	multi_route_margin: f32,
}
impl QueryRouter {
	pub fn new(cfg: &pandu_config::Router) -> Self {
		let profiles = cfg
			.collections
			.iter()
			.map(|collection| CollectionProfile {
				name: collection.name.clone(),
				domain: collection.domain.clone(),
				keywords: collection.keywords.iter().cloned().collect(),
			})
			.collect();

		Self {
			profiles,
			confidence_floor: cfg.confidence_floor,
			fallback: cfg.fallback_collection.clone(),
			multi_route_margin: cfg.multi_route_margin,
		}
	}

	pub fn fallback_collection(&self) -> &str {
		&self.fallback
	}

	pub fn route(&self, query: &str, domain_hint: Option<&str>) -> RouteDecision {
		let tokens = tokenize_query(query);
		let mut domain_scores = HashMap::with_capacity(self.profiles.len());

		for profile in &self.profiles {
			domain_scores.insert(profile.name.clone(), score_profile(profile, &tokens));
		}

		if let Some(hint) = domain_hint {
			let hint = hint.trim().to_lowercase();

			if let Some(profile) =
				self.profiles.iter().find(|p| p.domain == hint || p.name.to_lowercase() == hint)
			{
				return RouteDecision {
					collections: vec![profile.name.clone()],
					confidence: 1.0,
					domain_scores,
					pinned: true,
				};
			}

			tracing::debug!(%hint, "Domain hint matches no collection; falling back to scoring.");
		}

		// Ties break by name so the decision is reproducible.
		let best = self
			.profiles
			.iter()
			.map(|profile| (profile, domain_scores[&profile.name]))
			.max_by(|(left, ls), (right, rs)| {
				ls.partial_cmp(rs)
					.unwrap_or(std::cmp::Ordering::Equal)
					.then_with(|| right.name.cmp(&left.name))
			});
		let Some((best_profile, best_score)) = best else {
			return RouteDecision {
				collections: vec![self.fallback.clone()],
				confidence: 0.0,
				domain_scores,
				pinned: false,
			};
		};

		if best_score < self.confidence_floor {
			return RouteDecision {
				collections: vec![self.fallback.clone()],
				confidence: best_score,
				domain_scores,
				pinned: false,
			};
		}

		let mut selected: Vec<(&String, f32)> = self
			.profiles
			.iter()
			.map(|profile| (&profile.name, domain_scores[&profile.name]))
			.filter(|(_, score)| *score > 0.0 && best_score - *score <= self.multi_route_margin)
			.collect();

		selected.sort_by(|(ln, ls), (rn, rs)| {
			rs.partial_cmp(ls).unwrap_or(std::cmp::Ordering::Equal).then_with(|| ln.cmp(rn))
		});

		let mut collections: Vec<String> =
			selected.into_iter().map(|(name, _)| name.clone()).collect();

		if collections.is_empty() {
			collections.push(best_profile.name.clone());
		}

		RouteDecision { collections, confidence: best_score, domain_scores, pinned: false }
	}
}

fn score_profile(profile: &CollectionProfile, tokens: &[String]) -> f32 {
	if tokens.is_empty() {
		return 0.0;
	}

	let matched =
		tokens.iter().filter(|token| profile.keywords.contains(token.as_str())).count();
	let overlap = matched as f32 / tokens.len() as f32;
	let domain_mention =
		if tokens.iter().any(|token| token == &profile.domain) { 0.3 } else { 0.0 };

	(overlap + domain_mention).min(1.0)
}

fn tokenize_query(query: &str) -> Vec<String> {
	let mut normalized = String::with_capacity(query.len());

	for ch in query.chars() {
		if ch.is_alphanumeric() {
			normalized.extend(ch.to_lowercase());
		} else {
			normalized.push(' ');
		}
	}

	let mut out = Vec::new();
	let mut seen = HashSet::new();

	for token in normalized.split_whitespace() {
		if token.chars().count() < 2 {
			continue;
		}
		if seen.insert(token.to_string()) {
			out.push(token.to_string());
		}
	}

	out
}
