//! Integration tests for header inspection and delimiter sniffing.

use cohortbeam::descriptor::{Delimiter, FileDescriptor};
use cohortbeam::ident::SubjectKey;
use cohortbeam::io::LineEnding;
use cohortbeam::schema::RecordType;
use std::fs;
use tempfile::TempDir;

const TOKEN: &str = "|~|";

fn inspect(dir: &TempDir, name: &str, contents: &str) -> anyhow::Result<FileDescriptor> {
    let path = dir.path().join(name);
    fs::write(&path, contents)?;
    Ok(FileDescriptor::inspect(&path, TOKEN))
}

#[test]
fn test_semicolon_subject_file() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let desc = inspect(
        &dir,
        "pop.csv",
        "SubjectID;Birthdate;Gender;StartDate;EndDate\n1;19500101;F;20000101;20101231\n",
    )?;

    assert!(desc.is_valid());
    assert_eq!(desc.delimiter(), Some(&Delimiter::Semicolon));
    assert_eq!(desc.record_type(), Some(RecordType::Subject));
    assert_eq!(desc.mandatory_indices(), Some(&[0, 1, 2, 3, 4][..]));
    assert_eq!(desc.line_ending(), LineEnding::Lf);
    assert!(!desc.is_header_only());
    Ok(())
}

#[test]
fn test_string_token_delimiter() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let desc = inspect(
        &dir,
        "ev.txt",
        "SubjectID|~|EventType|~|Date\n1|~|MI|~|20050101\n",
    )?;

    assert_eq!(desc.delimiter(), Some(&Delimiter::Token(TOKEN.to_string())));
    assert_eq!(desc.record_type(), Some(RecordType::Event));
    let fields = desc.split("7|~|STROKE|~|20060101");
    assert_eq!(fields, vec!["7", "STROKE", "20060101"]);
    Ok(())
}

#[test]
fn test_quoted_header_and_crlf() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let desc = inspect(
        &dir,
        "disp.csv",
        "\"subjectid\",\"DATE\",\"Atc\",\"Duration\"\r\n1,20200101,N02BE01,5\r\n",
    )?;

    assert_eq!(desc.record_type(), Some(RecordType::Dispensing));
    assert_eq!(desc.line_ending(), LineEnding::CrLf);
    assert_eq!(desc.header(), &["subjectid", "DATE", "Atc", "Duration"]);
    assert_eq!(desc.column_index("atc"), Some(2));
    Ok(())
}

#[test]
fn test_header_matching_two_schemas_is_a_subject_file() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let desc = inspect(
        &dir,
        "both.csv",
        "SubjectID,Birthdate,Gender,StartDate,EndDate,EventType,Date\n1,1,F,1,1,X,1\n",
    )?;
    assert_eq!(desc.record_type(), Some(RecordType::Subject));
    Ok(())
}

#[test]
fn test_unusable_files() -> anyhow::Result<()> {
    let dir = TempDir::new()?;

    let unknown = inspect(&dir, "unknown.csv", "a,b,c\n1,2,3\n")?;
    assert_eq!(unknown.record_type(), None);
    assert!(!unknown.is_valid());

    let undelimited = inspect(&dir, "one.txt", "SubjectID\n1\n")?;
    assert_eq!(undelimited.delimiter(), None);
    assert!(!undelimited.is_valid());

    let missing = FileDescriptor::inspect(dir.path().join("absent.csv"), TOKEN);
    assert!(missing.header().is_empty());
    assert!(!missing.is_valid());
    Ok(())
}

#[test]
fn test_header_only_file() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let desc = inspect(
        &dir,
        "meas.csv",
        "SubjectID,Date,MeasurementType,Value\n\n\n",
    )?;
    assert!(desc.is_valid());
    assert!(desc.is_header_only());
    Ok(())
}

#[test]
fn test_extra_columns_and_subset_key() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let desc = inspect(
        &dir,
        "ev.csv",
        "SubsetID,SubjectID,EventType,Date,Origin\nA,12,MI,20050101,GP\n",
    )?;

    assert_eq!(desc.subset_index(), Some(0));
    assert_eq!(desc.id_index(), Some(1));
    let extras: Vec<_> = desc.extra_columns().iter().map(|(i, n)| (*i, n.as_str())).collect();
    assert_eq!(extras, vec![(4, "Origin")]);

    let fields = desc.split("A,12,MI,20050101,GP");
    assert_eq!(
        desc.key_of(&fields),
        Some(SubjectKey::new(Some("A".into()), "12"))
    );
    assert_eq!(
        desc.extra_values(&fields),
        vec![("Origin".to_string(), "GP".to_string())]
    );
    Ok(())
}

#[test]
fn test_probe_sorted_uses_length_first_order() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let header = "SubjectID,EventType,Date\n";

    let sorted = inspect(&dir, "a.csv", &format!("{header}1,X,1\n2,X,1\n2,Y,1\n10,X,1\n"))?;
    assert!(sorted.probe_sorted()?);

    let lexical = inspect(&dir, "b.csv", &format!("{header}1,X,1\n10,X,1\n2,X,1\n"))?;
    assert!(!lexical.probe_sorted()?);
    Ok(())
}

#[test]
fn test_probe_sorted_orders_by_subset_first() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let desc = inspect(
        &dir,
        "ev.csv",
        "SubsetID,SubjectID,EventType,Date\nA,5,X,1\nA,10,X,1\nB,1,X,1\n",
    )?;
    assert!(desc.probe_sorted()?);

    let desc = inspect(
        &dir,
        "ev2.csv",
        "SubsetID,SubjectID,EventType,Date\nB,1,X,1\nA,5,X,1\n",
    )?;
    assert!(!desc.probe_sorted()?);
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn test_gzip_input_is_inspected_transparently() -> anyhow::Result<()> {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let dir = TempDir::new()?;
    let path = dir.path().join("events.csv.gz");
    let mut enc = GzEncoder::new(fs::File::create(&path)?, Compression::default());
    enc.write_all(b"SubjectID,EventType,Date\n1,MI,20050101\n")?;
    enc.finish()?;

    let desc = FileDescriptor::inspect(&path, TOKEN);
    assert_eq!(desc.record_type(), Some(RecordType::Event));
    let mut lines = desc.data_lines()?;
    assert_eq!(lines.next_line()?, Some("1,MI,20050101"));
    assert_eq!(lines.next_line()?, None);
    Ok(())
}
