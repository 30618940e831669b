#[cfg(test)]
mod tests {
    use crate::types::*;

    #[test]
    fn display_impls_are_snake_case() {
        assert_eq!(WorkType::CheckStop.to_string(), "check_stop");
        assert_eq!(Step::Investigating.to_string(), "investigating");
        assert_eq!(ReasonType::HostMaintenance.to_string(), "host_maintenance");
        assert_eq!(
            InstanceType::SecondaryStorageVm.to_string(),
            "secondary_storage_vm"
        );
    }

    #[test]
    fn work_item_id_displays_as_bare_number() {
        assert_eq!(WorkItemId(42).to_string(), "42");
    }

    #[test]
    fn only_stop_family_work_types_are_valid_for_schedule_stop() {
        let valid =
            |w: WorkType| matches!(w, WorkType::Stop | WorkType::CheckStop | WorkType::ForceStop);
        assert!(valid(WorkType::Stop));
        assert!(valid(WorkType::CheckStop));
        assert!(valid(WorkType::ForceStop));
        assert!(!valid(WorkType::Ha));
        assert!(!valid(WorkType::Migration));
        assert!(!valid(WorkType::Destroy));
    }
}
