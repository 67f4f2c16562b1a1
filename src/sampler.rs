//! Per-category quota sampling.

use std::collections::{BTreeSet, HashSet};

use rand::Rng;
use rand::seq::index;

use crate::domain::{CandidateProject, Category};

/// Quota position of one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryQuota {
    pub category: Category,
    /// Candidates of this category already marked completed
    pub completed: usize,
    /// Candidates not yet completed
    pub available: usize,
    pub target: usize,
    /// How many were drawn this run
    pub selected: usize,
}

impl CategoryQuota {
    pub fn needed(&self) -> usize {
        self.target.saturating_sub(self.completed)
    }

    pub fn percent_of_target(&self) -> f64 {
        if self.target == 0 {
            return 100.0;
        }
        (self.completed as f64 / self.target as f64 * 100.0).min(100.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct QuotaSelection {
    pub selected: Vec<CandidateProject>,
    pub per_category: Vec<CategoryQuota>,
}

/// Draw, per category, `min(target - completed, available)` uncompleted
/// candidates uniformly without replacement.
///
/// Candidates are ordered by name before drawing, so the same inputs and the
/// same seeded `rng` always give the same selection.
pub fn fill_quota<R: Rng + ?Sized>(
    candidates: &[CandidateProject],
    completed: &HashSet<String>,
    target: usize,
    categories: &[Category],
    rng: &mut R,
) -> QuotaSelection {
    let mut selection = QuotaSelection::default();

    for &category in categories {
        let (done, pool) = split_category(candidates, completed, category);
        let mut quota = CategoryQuota {
            category,
            completed: done,
            available: pool.len(),
            target,
            selected: 0,
        };

        let amount = quota.needed().min(pool.len());
        if amount > 0 {
            let mut picks: Vec<usize> = index::sample(rng, pool.len(), amount).into_vec();
            picks.sort_unstable();
            selection.selected.extend(picks.into_iter().map(|i| pool[i].clone()));
        }
        quota.selected = amount;

        tracing::info!(
            category = %category,
            completed = quota.completed,
            needed = quota.needed(),
            available = quota.available,
            selected = amount,
            "Quota computed"
        );
        selection.per_category.push(quota);
    }

    selection
}

/// Quota position of every category, without drawing anything.
pub fn quota_status(
    candidates: &[CandidateProject],
    completed: &HashSet<String>,
    target: usize,
    categories: &[Category],
) -> Vec<CategoryQuota> {
    categories
        .iter()
        .map(|&category| {
            let (done, pool) = split_category(candidates, completed, category);
            CategoryQuota {
                category,
                completed: done,
                available: pool.len(),
                target,
                selected: 0,
            }
        })
        .collect()
}

/// Completed count and the name-ordered pool of distinct uncompleted
/// candidates for `category`.
fn split_category<'a>(
    candidates: &'a [CandidateProject],
    completed: &HashSet<String>,
    category: Category,
) -> (usize, Vec<&'a CandidateProject>) {
    let mut seen = BTreeSet::new();
    let mut done = 0;
    let mut pool = Vec::new();

    for candidate in candidates.iter().filter(|c| c.category == category) {
        if !seen.insert(candidate.name.as_str()) {
            continue;
        }
        if completed.contains(&candidate.name) {
            done += 1;
        } else {
            pool.push(candidate);
        }
    }
    pool.sort_by(|a, b| a.name.cmp(&b.name));
    (done, pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn projects(category: Category, prefix: &str, n: usize) -> Vec<CandidateProject> {
        (0..n)
            .map(|i| {
                CandidateProject::new(
                    format!("{}-{}", prefix, i),
                    category,
                    format!("https://github.com/apache/{}-{}", prefix, i),
                )
            })
            .collect()
    }

    fn names(projects: &[CandidateProject]) -> Vec<String> {
        projects.iter().map(|p| p.name.clone()).collect()
    }

    #[test]
    fn test_fifty_eight_of_sixty_done_selects_two() {
        let mut candidates = projects(Category::Java, "done", 58);
        let completed: HashSet<String> = names(&candidates).into_iter().collect();
        candidates.extend(projects(Category::Java, "open", 10));

        let mut rng = StdRng::seed_from_u64(7);
        let selection = fill_quota(&candidates, &completed, 60, &[Category::Java], &mut rng);

        assert_eq!(selection.selected.len(), 2);
        assert!(selection.selected.iter().all(|p| !completed.contains(&p.name)));
        assert_eq!(selection.per_category[0].completed, 58);
        assert_eq!(selection.per_category[0].available, 10);
    }

    #[test]
    fn test_target_met_selects_nothing() {
        let candidates = projects(Category::Python, "p", 5);
        let completed: HashSet<String> = names(&candidates).into_iter().collect();
        let mut rng = StdRng::seed_from_u64(1);

        let selection = fill_quota(&candidates, &completed, 3, &[Category::Python], &mut rng);
        assert!(selection.selected.is_empty());
        assert_eq!(selection.per_category[0].needed(), 0);
    }

    #[test]
    fn test_short_pool_takes_everything_available() {
        let candidates = projects(Category::Cpp, "c", 4);
        let mut rng = StdRng::seed_from_u64(3);

        let selection = fill_quota(&candidates, &HashSet::new(), 60, &[Category::Cpp], &mut rng);
        let mut picked = names(&selection.selected);
        picked.sort();
        assert_eq!(picked, names(&candidates));
    }

    #[test]
    fn test_same_seed_same_selection() {
        let candidates = projects(Category::Java, "j", 40);
        let first = fill_quota(&candidates, &HashSet::new(), 10, &[Category::Java], &mut StdRng::seed_from_u64(42));
        let second = fill_quota(&candidates, &HashSet::new(), 10, &[Category::Java], &mut StdRng::seed_from_u64(42));
        assert_eq!(names(&first.selected), names(&second.selected));
    }

    #[test]
    fn test_input_order_does_not_change_selection() {
        let candidates = projects(Category::Java, "j", 20);
        let mut reversed = candidates.clone();
        reversed.reverse();

        let a = fill_quota(&candidates, &HashSet::new(), 5, &[Category::Java], &mut StdRng::seed_from_u64(9));
        let b = fill_quota(&reversed, &HashSet::new(), 5, &[Category::Java], &mut StdRng::seed_from_u64(9));
        assert_eq!(names(&a.selected), names(&b.selected));
    }

    #[test]
    fn test_duplicate_names_are_drawn_once() {
        let mut candidates = projects(Category::Java, "j", 3);
        candidates.extend(projects(Category::Java, "j", 3));
        let mut rng = StdRng::seed_from_u64(5);

        let selection = fill_quota(&candidates, &HashSet::new(), 60, &[Category::Java], &mut rng);
        assert_eq!(selection.selected.len(), 3);
    }

    #[test]
    fn test_categories_are_independent() {
        let mut candidates = projects(Category::Java, "j", 5);
        candidates.extend(projects(Category::Cpp, "c", 5));
        let completed: HashSet<String> = names(&candidates[..5]).into_iter().collect();
        let mut rng = StdRng::seed_from_u64(11);

        let selection = fill_quota(&candidates, &completed, 5, &[Category::Java, Category::Cpp], &mut rng);
        assert!(selection.selected.iter().all(|p| p.category == Category::Cpp));
        assert_eq!(selection.selected.len(), 5);
    }

    #[test]
    fn test_resume_never_reselects_completed() {
        let candidates = projects(Category::Java, "j", 30);
        let first = fill_quota(&candidates, &HashSet::new(), 10, &[Category::Java], &mut StdRng::seed_from_u64(1));

        let completed: HashSet<String> = names(&first.selected).into_iter().collect();
        let second = fill_quota(&candidates, &completed, 20, &[Category::Java], &mut StdRng::seed_from_u64(1));

        assert_eq!(second.selected.len(), 10);
        assert!(second.selected.iter().all(|p| !completed.contains(&p.name)));
    }

    #[test]
    fn test_quota_status_percentages() {
        let candidates = projects(Category::Java, "j", 4);
        let completed: HashSet<String> = names(&candidates[..3]).into_iter().collect();
        let status = quota_status(&candidates, &completed, 6, &[Category::Java]);

        assert_eq!(status[0].completed, 3);
        assert_eq!(status[0].available, 1);
        assert_eq!(status[0].percent_of_target(), 50.0);
    }
}
