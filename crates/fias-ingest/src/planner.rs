//! Splits selected files across worker processes
//!
//! All files of one entity go to the same worker, inserts ahead of deletes,
//! and each entity group lands in whichever worker currently carries the
//! fewest bytes.

use std::sync::Arc;
use tracing::{debug, info};

use crate::entity::EntityManager;
use crate::error::{IngestError, Result};
use crate::models::SelectedFile;

#[derive(Debug, Default)]
struct WorkerBucket {
    files: Vec<SelectedFile>,
    weight: u64,
}

#[derive(Debug)]
struct EntityGroup {
    entity: String,
    inserts: Vec<SelectedFile>,
    deletes: Vec<SelectedFile>,
}

impl EntityGroup {
    fn weight(&self) -> u64 {
        self.inserts.iter().chain(&self.deletes).map(SelectedFile::size).sum()
    }
}

pub struct ThreadPlanner {
    entities: Arc<dyn EntityManager>,
}

impl ThreadPlanner {
    pub fn new(entities: Arc<dyn EntityManager>) -> Self {
        Self { entities }
    }

    /// Partition `files` into at most `worker_count` non-empty lists
    pub fn plan(&self, files: &[SelectedFile], worker_count: i64) -> Result<Vec<Vec<SelectedFile>>> {
        if worker_count <= 0 {
            return Err(IngestError::Config(format!(
                "worker count must be at least 1, got {}",
                worker_count
            )));
        }
        let worker_count = usize::try_from(worker_count)
            .map_err(|_| IngestError::Config(format!("worker count {} is too large", worker_count)))?;

        let groups = self.group_by_entity(files);
        let mut buckets: Vec<WorkerBucket> = Vec::new();
        buckets.resize_with(worker_count.min(groups.len().max(1)), WorkerBucket::default);

        for group in groups {
            let weight = group.weight();
            // min_by_key returns the first minimum, i.e. the lowest index
            let bucket = buckets
                .iter_mut()
                .min_by_key(|b| b.weight)
                .ok_or_else(|| IngestError::Internal("planner has no buckets".to_string()))?;

            debug!(entity = %group.entity, weight, "Assigned entity group");
            bucket.weight += weight;
            bucket.files.extend(group.inserts);
            bucket.files.extend(group.deletes);
        }

        let plan: Vec<Vec<SelectedFile>> = buckets
            .into_iter()
            .filter(|b| !b.files.is_empty())
            .map(|b| b.files)
            .collect();

        info!(
            files = files.len(),
            workers = plan.len(),
            requested_workers = worker_count,
            "Planned worker distribution"
        );
        Ok(plan)
    }

    /// Groups in first-encounter order; unmatched files are dropped
    fn group_by_entity(&self, files: &[SelectedFile]) -> Vec<EntityGroup> {
        let mut groups: Vec<EntityGroup> = Vec::new();

        for file in files {
            let name = file.file_name();
            let (descriptor, is_insert) = match self.entities.descriptor_by_insert_file(name) {
                Some(d) => (d, true),
                None => match self.entities.descriptor_by_delete_file(name) {
                    Some(d) => (d, false),
                    None => {
                        debug!(file = %file.path().display(), "File matches no entity, skipping");
                        continue;
                    },
                },
            };

            let index = match groups.iter().position(|g| g.entity == descriptor.name()) {
                Some(index) => index,
                None => {
                    groups.push(EntityGroup {
                        entity: descriptor.name().to_string(),
                        inserts: Vec::new(),
                        deletes: Vec::new(),
                    });
                    groups.len() - 1
                },
            };

            let group = &mut groups[index];
            if is_insert {
                group.inserts.push(file.clone());
            } else {
                group.deletes.push(file.clone());
            }
        }

        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::RegistryEntityManager;
    use std::collections::HashMap;

    fn planner() -> ThreadPlanner {
        let registry = RegistryEntityManager::from_json(
            r#"{"entities": [
                {"name": "a", "insertFileMask": "INS_A_*.XML", "deleteFileMask": "DEL_A_*.XML"},
                {"name": "b", "insertFileMask": "INS_B_*.XML", "deleteFileMask": "DEL_B_*.XML"},
                {"name": "c", "insertFileMask": "INS_C_*.XML", "deleteFileMask": "DEL_C_*.XML"}
            ]}"#,
        )
        .unwrap();
        ThreadPlanner::new(Arc::new(registry))
    }

    fn file(name: &str, size: u64) -> SelectedFile {
        SelectedFile::new(name, size, None).unwrap()
    }

    fn names(bucket: &[SelectedFile]) -> Vec<&str> {
        bucket.iter().map(|f| f.file_name()).collect()
    }

    #[test]
    fn test_largest_group_goes_to_emptier_bucket() {
        let files = vec![file("INS_A_1.XML", 100), file("DEL_A_1.XML", 50), file("INS_B_1.XML", 10)];

        let plan = planner().plan(&files, 2).unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(names(&plan[0]), vec!["INS_A_1.XML", "DEL_A_1.XML"]);
        assert_eq!(names(&plan[1]), vec!["INS_B_1.XML"]);
    }

    #[test]
    fn test_inserts_precede_deletes_within_entity() {
        let files = vec![
            file("DEL_A_1.XML", 5),
            file("INS_B_1.XML", 5),
            file("INS_A_1.XML", 5),
            file("DEL_A_2.XML", 5),
            file("INS_A_2.XML", 5),
        ];

        let plan = planner().plan(&files, 1).unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(
            names(&plan[0]),
            vec!["INS_A_1.XML", "INS_A_2.XML", "DEL_A_1.XML", "DEL_A_2.XML", "INS_B_1.XML"]
        );
    }

    #[test]
    fn test_entity_groups_are_atomic() {
        let files: Vec<_> = (0..30)
            .map(|i| {
                let entity = ["A", "B", "C"][i % 3];
                let kind = if i % 2 == 0 { "INS" } else { "DEL" };
                file(&format!("{}_{}_{}.XML", kind, entity, i), (i as u64 + 1) * 7)
            })
            .collect();

        for workers in 1..=5 {
            let plan = planner().plan(&files, workers).unwrap();
            let mut owner: HashMap<char, usize> = HashMap::new();
            for (index, bucket) in plan.iter().enumerate() {
                for f in bucket {
                    let entity = f.file_name().chars().nth(4).unwrap();
                    assert_eq!(*owner.entry(entity).or_insert(index), index);
                }
            }
            assert_eq!(plan.iter().map(Vec::len).sum::<usize>(), 30);
        }
    }

    #[test]
    fn test_each_group_gets_own_bucket_when_workers_suffice() {
        let files = vec![file("INS_A_1.XML", 1), file("INS_B_1.XML", 1000), file("INS_C_1.XML", 1)];

        let plan = planner().plan(&files, 8).unwrap();

        assert_eq!(plan.len(), 3);
        assert!(plan.iter().all(|bucket| bucket.len() == 1));
    }

    #[test]
    fn test_unmatched_files_are_dropped() {
        let files = vec![file("README.TXT", 10), file("INS_C_1.XML", 3)];

        let plan = planner().plan(&files, 2).unwrap();

        assert_eq!(plan, vec![vec![file("INS_C_1.XML", 3)]]);
        assert!(planner().plan(&[file("README.TXT", 10)], 2).unwrap().is_empty());
    }

    #[test]
    fn test_empty_input_and_invalid_worker_count() {
        assert!(planner().plan(&[], 3).unwrap().is_empty());

        let files = vec![file("INS_A_1.XML", 1)];
        assert!(planner().plan(&files, 0).unwrap_err().is_config());
        assert!(planner().plan(&files, -1).unwrap_err().is_config());
    }
}
