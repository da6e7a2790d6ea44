// service/allocation.rs
use uuid::Uuid;

use crate::service::error::ServiceError;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct WorkerShare {
    pub worker_id: Uuid,
    /// Centavos.
    pub amount: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AllocationSplit {
    pub allocations: Vec<WorkerShare>,
    pub remaining_budget: i64,
}

/// Split a job budget across workers. Without explicit percentages the
/// budget is divided evenly, floor per worker, with the leftover centavos
/// assigned to the first worker so the amounts sum exactly to the budget.
///
/// Pure; called once per job finalization. Contracts freeze the resulting
/// amounts, so re-invoking this never re-splits already-allocated funds.
pub fn split_allocation(
    job_budget: i64,
    worker_ids: &[Uuid],
    explicit_percentages: Option<&[f64]>,
) -> Result<AllocationSplit, ServiceError> {
    if job_budget <= 0 {
        return Err(ServiceError::Validation(
            "Job budget must be positive".to_string(),
        ));
    }
    if worker_ids.is_empty() {
        return Err(ServiceError::Validation(
            "At least one worker is required".to_string(),
        ));
    }

    let allocations: Vec<WorkerShare> = match explicit_percentages {
        Some(percentages) => {
            if percentages.len() != worker_ids.len() {
                return Err(ServiceError::Validation(
                    "One percentage per worker is required".to_string(),
                ));
            }
            if percentages.iter().any(|p| *p < 0.0) {
                return Err(ServiceError::Validation(
                    "Allocation percentages cannot be negative".to_string(),
                ));
            }
            let total: f64 = percentages.iter().sum();
            if total > 100.0 {
                return Err(ServiceError::Validation(format!(
                    "Allocation percentages sum to {total}, which exceeds 100"
                )));
            }

            worker_ids
                .iter()
                .zip(percentages)
                .map(|(worker_id, pct)| WorkerShare {
                    worker_id: *worker_id,
                    amount: (job_budget as f64 * pct / 100.0).floor() as i64,
                    percentage: *pct,
                })
                .collect()
        }
        None => {
            let n = worker_ids.len() as i64;
            let base = job_budget / n;
            let remainder = job_budget - base * n;
            let percentage = 100.0 / n as f64;

            worker_ids
                .iter()
                .enumerate()
                .map(|(i, worker_id)| WorkerShare {
                    worker_id: *worker_id,
                    // Leftover centavos go to the first worker, deterministically.
                    amount: if i == 0 { base + remainder } else { base },
                    percentage,
                })
                .collect()
        }
    };

    let allocated: i64 = allocations.iter().map(|a| a.amount).sum();
    Ok(AllocationSplit {
        allocations,
        remaining_budget: job_budget - allocated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workers(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::new_v4()).collect()
    }

    #[test]
    fn even_split_two_workers() {
        let ids = workers(2);
        let split = split_allocation(900_000, &ids, None).unwrap();
        assert_eq!(split.allocations[0].amount, 450_000);
        assert_eq!(split.allocations[1].amount, 450_000);
        assert_eq!(split.remaining_budget, 0);
    }

    #[test]
    fn even_split_remainder_goes_to_first_worker() {
        let ids = workers(3);
        let split = split_allocation(10_000, &ids, None).unwrap();
        assert_eq!(split.allocations[0].amount, 3334);
        assert_eq!(split.allocations[1].amount, 3333);
        assert_eq!(split.allocations[2].amount, 3333);
        assert_eq!(split.remaining_budget, 0);
    }

    #[test]
    fn explicit_percentages_floor_amounts() {
        let ids = workers(2);
        let split = split_allocation(10_001, &ids, Some(&[50.0, 25.0])).unwrap();
        assert_eq!(split.allocations[0].amount, 5000);
        assert_eq!(split.allocations[1].amount, 2500);
        assert_eq!(split.remaining_budget, 2501);
    }

    #[test]
    fn amounts_plus_remaining_equals_budget() {
        for (budget, n) in [(1, 1), (999, 4), (1_000_003, 7), (50, 3)] {
            let ids = workers(n);
            let split = split_allocation(budget, &ids, None).unwrap();
            let allocated: i64 = split.allocations.iter().map(|a| a.amount).sum();
            assert_eq!(allocated + split.remaining_budget, budget);
            assert!(split.remaining_budget >= 0);
        }
    }

    #[test]
    fn rejects_negative_percentage() {
        let ids = workers(2);
        assert!(split_allocation(1000, &ids, Some(&[60.0, -10.0])).is_err());
    }

    #[test]
    fn rejects_percentages_over_hundred() {
        let ids = workers(2);
        assert!(split_allocation(1000, &ids, Some(&[60.0, 41.0])).is_err());
    }

    #[test]
    fn rejects_percentage_count_mismatch() {
        let ids = workers(3);
        assert!(split_allocation(1000, &ids, Some(&[50.0, 50.0])).is_err());
    }

    #[test]
    fn rejects_empty_worker_set_and_zero_budget() {
        assert!(split_allocation(1000, &[], None).is_err());
        assert!(split_allocation(0, &workers(1), None).is_err());
    }
}
