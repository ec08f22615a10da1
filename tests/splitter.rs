//! Integration tests for hash partitioning into bucket files.

use cohortbeam::config::EngineConfig;
use cohortbeam::file_set::FileSet;
use cohortbeam::ident::SubjectKey;
use cohortbeam::schema::RecordType;
use cohortbeam::splitter::{LOST_DIR, SplitLayout, Splitter};
use cohortbeam::testing::{CohortFixture, RowOrder, WorkDirBuilder, fixture_file_name};
use std::collections::HashMap;
use std::fs;

fn bucket_lines(layout: &SplitLayout, ty: RecordType) -> anyhow::Result<Vec<(usize, String)>> {
    let mut out = Vec::new();
    for bucket in 0..layout.bucket_count() {
        let text = fs::read_to_string(layout.bucket_file(bucket, ty))?;
        out.extend(text.lines().map(|l| (bucket, l.to_string())));
    }
    Ok(out)
}

#[test]
fn test_every_line_lands_in_its_routed_bucket() -> anyhow::Result<()> {
    let cohort = CohortFixture::generate(25, &["A", "B"]);
    let work = WorkDirBuilder::new()?
        .cohort(&cohort, RowOrder::Shuffled)?
        .build();
    let files = FileSet::from_directory(work.path(), &EngineConfig::default())?;
    let layout = SplitLayout::new(work.join("split"), 4);

    // tiny threshold forces many global flushes
    let summary = Splitter::new(layout.clone(), 64).split(&files)?;
    assert!(summary.flushes > 1);

    for ty in RecordType::ALL {
        let desc = files.require(ty)?;
        let lines = bucket_lines(&layout, ty)?;
        assert_eq!(lines.len(), cohort.table(ty).len(), "{ty} line count");
        assert_eq!(summary.lines[ty.index()], lines.len() as u64);
        for (bucket, line) in &lines {
            let key = desc
                .key_of(&desc.split(line))
                .ok_or_else(|| anyhow::anyhow!("line without key: {line}"))?;
            assert_eq!(*bucket, key.bucket(4), "{line} in wrong bucket");
        }
    }

    assert_eq!(summary.subset_counts.get("A"), Some(&22));
    assert_eq!(summary.subset_counts.get("B"), Some(&22));
    assert_eq!(summary.lost_lines, [0; 4]);
    Ok(())
}

#[test]
fn test_same_subject_shares_a_bucket_across_types() -> anyhow::Result<()> {
    let cohort = CohortFixture::generate(30, &[]);
    let work = WorkDirBuilder::new()?.cohort(&cohort, RowOrder::Sorted)?.build();
    let files = FileSet::from_directory(work.path(), &EngineConfig::default())?;
    let layout = SplitLayout::new(work.join("split"), 3);
    Splitter::new(layout.clone(), 1 << 20).split(&files)?;

    let mut home: HashMap<SubjectKey, usize> = HashMap::new();
    for ty in RecordType::ALL {
        let desc = files.require(ty)?;
        for (bucket, line) in bucket_lines(&layout, ty)? {
            let Some(key) = desc.key_of(&desc.split(&line)) else { continue };
            let first = *home.entry(key).or_insert(bucket);
            assert_eq!(first, bucket);
        }
    }
    Ok(())
}

#[test]
fn test_lines_without_identifier_go_to_lost() -> anyhow::Result<()> {
    let work = WorkDirBuilder::new()?
        .file(
            fixture_file_name(RecordType::Subject),
            "SubjectID,Birthdate,Gender,StartDate,EndDate\n1,19500101,F,20000101,20101231\n",
        )?
        .file(
            fixture_file_name(RecordType::Event),
            "EventType,Date,SubjectID\nMI,20050101,1\nSTROKE,20060101\n",
        )?
        .build();
    let files = FileSet::from_directory(work.path(), &EngineConfig::default())?;
    let layout = SplitLayout::new(work.join("split"), 2);
    let summary = Splitter::new(layout.clone(), 1 << 20).split(&files)?;

    assert_eq!(summary.lost_lines[RecordType::Event.index()], 1);
    assert_eq!(
        fs::read_to_string(layout.lost_file(RecordType::Event))?,
        "STROKE,20060101\n"
    );
    assert!(layout.root().join(LOST_DIR).is_dir());

    layout.teardown()?;
    assert!(!layout.root().exists());
    Ok(())
}

#[test]
fn test_placeholders_exist_only_for_selected_types() -> anyhow::Result<()> {
    let work = WorkDirBuilder::new()?
        .file(
            fixture_file_name(RecordType::Subject),
            "SubjectID,Birthdate,Gender,StartDate,EndDate\n1,19500101,F,20000101,20101231\n",
        )?
        .build();
    let files = FileSet::from_directory(work.path(), &EngineConfig::default())?;
    let layout = SplitLayout::new(work.join("split"), 3);
    Splitter::new(layout.clone(), 1 << 20).split(&files)?;

    for bucket in 0..3 {
        assert!(layout.bucket_file(bucket, RecordType::Subject).is_file());
        assert!(!layout.bucket_file(bucket, RecordType::Event).exists());
    }
    Ok(())
}
