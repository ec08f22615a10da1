//! Integration tests for the sorted merge and the partitioned hash join.

use cohortbeam::config::{EngineConfig, SortMode};
use cohortbeam::engine::{AssemblyMode, Engine, RunOutcome};
use cohortbeam::error::EngineError;
use cohortbeam::output::MemorySink;
use cohortbeam::record::SubjectAggregate;
use cohortbeam::schema::RecordType;
use cohortbeam::testing::{
    CohortFixture, RowOrder, WorkDir, WorkDirBuilder, fixture_file_name, init_test_logging,
};

const SUBJECT_HEADER: &str = "SubjectID,Birthdate,Gender,StartDate,EndDate";

fn config(mode: SortMode) -> EngineConfig {
    EngineConfig {
        sort_mode: mode,
        ..EngineConfig::default()
    }
}

fn run(work: &WorkDir, config: EngineConfig) -> anyhow::Result<(RunOutcome, MemorySink)> {
    let engine = Engine::from_directory(config, work.path())?;
    let mut sink = MemorySink::new();
    let outcome = engine.run_with_sink(work.path(), &mut sink)?;
    Ok((outcome, sink))
}

fn ids(sink: &MemorySink) -> Vec<&str> {
    sink.subjects.iter().map(|a| a.key().id.as_str()).collect()
}

fn gap_work_dir() -> anyhow::Result<WorkDir> {
    Ok(WorkDirBuilder::new()?
        .file(
            fixture_file_name(RecordType::Subject),
            &format!(
                "{SUBJECT_HEADER}\n1,19500101,F,20000101,20201231\n2,19500101,M,20000101,20201231\n5,19500101,F,20000101,20201231\n"
            ),
        )?
        .file(
            fixture_file_name(RecordType::Event),
            "SubjectID,EventType,Date\n2,MI,20050101\n3,MI,20050101\n",
        )?
        .build())
}

#[test]
fn test_gap_record_is_unassigned_in_both_modes() -> anyhow::Result<()> {
    init_test_logging();
    for mode in [SortMode::Sorted, SortMode::Unsorted] {
        let work = gap_work_dir()?;
        let (outcome, sink) = run(&work, config(mode))?;

        assert_eq!(ids(&sink), vec!["1", "2", "5"], "{mode:?}");
        let two = &sink.subjects[1];
        assert_eq!(two.key().id, "2");
        assert_eq!(two.events.len(), 1);
        assert!(sink.subjects[0].events.is_empty());
        assert!(sink.subjects[2].events.is_empty());

        assert_eq!(sink.unassigned.len(), 1);
        let (ty, fields) = &sink.unassigned[0];
        assert_eq!(*ty, RecordType::Event);
        assert_eq!(fields, &vec!["", "3", "MI", "20050101"]);
        assert_eq!(outcome.statistics.unassigned_events, 1);
        assert_eq!(outcome.statistics.events, 1);
    }
    Ok(())
}

#[test]
fn test_length_first_order_in_merge_output() -> anyhow::Result<()> {
    let work = WorkDirBuilder::new()?
        .file(
            fixture_file_name(RecordType::Subject),
            &format!(
                "{SUBJECT_HEADER}\n1,19500101,F,20000101,20201231\n2,19500101,M,20000101,20201231\n10,19500101,F,20000101,20201231\n"
            ),
        )?
        .build();
    let (outcome, sink) = run(&work, config(SortMode::Auto))?;

    assert_eq!(outcome.mode, AssemblyMode::SortedMerge);
    assert_eq!(ids(&sink), vec!["1", "2", "10"]);
    let positions: Vec<u64> = sink.subjects.iter().map(|a| a.position).collect();
    assert_eq!(positions, vec![1, 2, 3]);
    Ok(())
}

#[test]
fn test_records_after_last_subject_are_unassigned() -> anyhow::Result<()> {
    let work = WorkDirBuilder::new()?
        .file(
            fixture_file_name(RecordType::Subject),
            &format!("{SUBJECT_HEADER}\n1,19500101,F,20000101,20201231\n"),
        )?
        .file(
            fixture_file_name(RecordType::Measurement),
            "SubjectID,Date,MeasurementType,Value\n1,20050101,BMI,22\n4,20050101,BMI,30\n9,20050101,BMI,31\n",
        )?
        .build();
    let (outcome, sink) = run(&work, config(SortMode::Sorted))?;

    assert_eq!(sink.subjects[0].measurements.len(), 1);
    assert_eq!(outcome.statistics.unassigned_measurements, 2);
    assert!(sink.finished);
    Ok(())
}

#[test]
fn test_duplicate_subject_aborts_both_modes() -> anyhow::Result<()> {
    for mode in [SortMode::Sorted, SortMode::Unsorted] {
        let work = WorkDirBuilder::new()?
            .file(
                fixture_file_name(RecordType::Subject),
                &format!(
                    "{SUBJECT_HEADER}\n1,19500101,F,20000101,20201231\n2,19500101,M,20000101,20201231\n2,19600101,F,20000101,20201231\n"
                ),
            )?
            .build();
        let engine = Engine::from_directory(config(mode), work.path())?;
        let mut sink = MemorySink::new();
        let err = engine
            .run_with_sink(work.path(), &mut sink)
            .err()
            .ok_or_else(|| anyhow::anyhow!("duplicate accepted in {mode:?}"))?;

        match err.downcast_ref::<EngineError>() {
            Some(EngineError::DuplicateSubject(key)) => assert_eq!(key.id, "2"),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(sink.finished, "sink is closed on the error path");
        assert!(!work.join("split").exists(), "scratch tree removed");
    }
    Ok(())
}

#[test]
fn test_unsorted_subjects_abort_a_forced_merge() -> anyhow::Result<()> {
    let work = WorkDirBuilder::new()?
        .file(
            fixture_file_name(RecordType::Subject),
            &format!(
                "{SUBJECT_HEADER}\n2,19500101,F,20000101,20201231\n1,19500101,M,20000101,20201231\n"
            ),
        )?
        .build();
    let engine = Engine::from_directory(config(SortMode::Sorted), work.path())?;
    let err = engine
        .run_with_sink(work.path(), &mut MemorySink::new())
        .err()
        .ok_or_else(|| anyhow::anyhow!("unsorted input accepted"))?;
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::SubjectOutOfOrder { .. })
    ));
    Ok(())
}

fn normalized(mut subjects: Vec<SubjectAggregate>) -> Vec<SubjectAggregate> {
    for s in &mut subjects {
        s.position = 0;
    }
    subjects.sort_by(|a, b| a.key().cmp(b.key()));
    subjects
}

#[test]
fn test_merge_and_partitioned_produce_the_same_aggregates() -> anyhow::Result<()> {
    let cohort = CohortFixture::generate(40, &["A", "B"]);
    let sorted = WorkDirBuilder::new()?.cohort(&cohort, RowOrder::Sorted)?.build();
    let shuffled = WorkDirBuilder::new()?.cohort(&cohort, RowOrder::Shuffled)?.build();

    let (merged, merged_sink) = run(&sorted, config(SortMode::Auto))?;
    let small_budget = EngineConfig {
        memory_budget_mb: 0.001,
        ..config(SortMode::Auto)
    };
    let (joined, joined_sink) = run(&shuffled, small_budget)?;

    assert_eq!(merged.mode, AssemblyMode::SortedMerge);
    assert_eq!(joined.mode, AssemblyMode::Partitioned);
    assert!(joined.statistics.buckets > 1);
    assert!(!shuffled.join("split").exists());

    assert_eq!(merged.statistics.subjects, cohort.subject_count() as u64);
    assert_eq!(normalized(merged_sink.subjects), normalized(joined_sink.subjects));
    assert_eq!(
        merged.statistics.unassigned_total(),
        joined.statistics.unassigned_total()
    );
    assert_eq!(
        merged.statistics.integrity_violations,
        joined.statistics.integrity_violations
    );
    Ok(())
}

#[test]
fn test_no_record_loss() -> anyhow::Result<()> {
    let cohort = CohortFixture::generate(50, &["X"]);
    for (order, mode) in [
        (RowOrder::Sorted, SortMode::Sorted),
        (RowOrder::Shuffled, SortMode::Unsorted),
    ] {
        let work = WorkDirBuilder::new()?.cohort(&cohort, order)?.build();
        let (outcome, sink) = run(&work, config(mode))?;
        let stats = &outcome.statistics;

        assert_eq!(
            stats.assigned_total() + stats.unassigned_total(),
            cohort.dependent_count() as u64
        );
        assert_eq!(stats.unassigned_total(), cohort.orphans as u64);
        assert_eq!(sink.unassigned.len(), cohort.orphans);
        let attached: usize = sink.subjects.iter().map(SubjectAggregate::dependent_count).sum();
        assert_eq!(attached as u64, stats.assigned_total());
        assert_eq!(stats.malformed_lines, 0);
    }
    Ok(())
}

#[test]
fn test_malformed_lines_are_counted_the_same_way_in_both_modes() -> anyhow::Result<()> {
    for mode in [SortMode::Sorted, SortMode::Unsorted] {
        let work = WorkDirBuilder::new()?
            .file(
                fixture_file_name(RecordType::Subject),
                &format!("{SUBJECT_HEADER}\n1,19500101,F,20000101,20201231\n2,19500101\n"),
            )?
            .file(
                fixture_file_name(RecordType::Event),
                "EventType,Date,SubjectID\nMI,20050101,1\nSTROKE,20060101\n",
            )?
            .build();
        let (outcome, sink) = run(&work, config(mode))?;

        assert_eq!(ids(&sink), vec!["1"], "{mode:?}");
        assert_eq!(sink.subjects[0].events.len(), 1);
        assert_eq!(outcome.statistics.malformed_lines, 2, "{mode:?}");
        assert_eq!(outcome.statistics.unassigned_events, 1, "{mode:?}");
        assert_eq!(sink.unassigned[0].1, vec!["", "STROKE", "20060101"]);
    }
    Ok(())
}

#[test]
fn test_invalid_utf8_payload_is_replaced_in_both_modes() -> anyhow::Result<()> {
    for mode in [SortMode::Sorted, SortMode::Unsorted] {
        let work = WorkDirBuilder::new()?
            .file(
                fixture_file_name(RecordType::Subject),
                &format!(
                    "{SUBJECT_HEADER}\n1,19500101,F,20000101,20201231\n2,19500101,M,20000101,20201231\n"
                ),
            )?
            .build();
        std::fs::write(
            work.join(fixture_file_name(RecordType::Event)),
            b"SubjectID,EventType,Date\n1,D\xE9p,20050101\n2,MI,20050102\n",
        )?;

        let (outcome, sink) = run(&work, config(mode))?;
        assert_eq!(ids(&sink), vec!["1", "2"], "{mode:?}");
        assert_eq!(sink.subjects[0].events[0].event_type, "D\u{FFFD}p");
        assert_eq!(sink.subjects[1].events[0].event_type, "MI");
        assert_eq!(outcome.statistics.events, 2);
        assert_eq!(outcome.statistics.malformed_lines, 0);
    }
    Ok(())
}

#[test]
fn test_malformed_rows_lead_with_subset_column() -> anyhow::Result<()> {
    for mode in [SortMode::Sorted, SortMode::Unsorted] {
        let work = WorkDirBuilder::new()?
            .file(
                fixture_file_name(RecordType::Subject),
                &format!("SubsetID,{SUBJECT_HEADER}\nA,1,19500101,F,20000101,20201231\n"),
            )?
            .file(
                fixture_file_name(RecordType::Event),
                "SubsetID,SubjectID,EventType,Date\nA,1,MI,20050101\nA,7\nA,9,MI,20050101\n",
            )?
            .build();
        let (outcome, sink) = run(&work, config(mode))?;

        assert_eq!(outcome.statistics.malformed_lines, 1, "{mode:?}");
        assert_eq!(sink.unassigned.len(), 2, "{mode:?}");
        assert!(sink.unassigned.iter().all(|(_, row)| row[0] == "A"));
        assert!(
            sink.unassigned
                .iter()
                .any(|(_, row)| row == &vec!["A", "A", "7"]),
            "{mode:?}"
        );
        assert!(
            sink.unassigned
                .iter()
                .any(|(_, row)| row == &vec!["A", "9", "MI", "20050101"]),
            "{mode:?}"
        );
    }
    Ok(())
}

#[test]
fn test_non_ascii_identifiers_follow_character_length() -> anyhow::Result<()> {
    let work = WorkDirBuilder::new()?
        .file(
            fixture_file_name(RecordType::Subject),
            &format!(
                "{SUBJECT_HEADER}\né,19500101,F,20000101,20201231\nab,19500101,M,20000101,20201231\n"
            ),
        )?
        .build();
    let (outcome, sink) = run(&work, config(SortMode::Auto))?;
    assert_eq!(outcome.mode, AssemblyMode::SortedMerge);
    assert_eq!(ids(&sink), vec!["é", "ab"]);
    Ok(())
}
