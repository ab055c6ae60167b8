use super::*;

#[test]
fn skips_comments_and_blank_lines() {
    let t = parse_table("# time re im\n\n0 1.5 -2\n  1\t2.5   3e-1\n", false).unwrap();
    assert!(t.header.is_empty());
    assert_eq!(t.rows.len(), 2);
    assert_eq!(t.rows[0], (3, vec![0.0, 1.5, -2.0]));
    assert_eq!(t.rows[1], (4, vec![1.0, 2.5, 0.3]));
}

#[test]
fn header_row_and_commas() {
    let t = parse_table("time,x1,y1\n0.0,1.0,2.0\n", true).unwrap();
    assert_eq!(t.header, vec!["time", "x1", "y1"]);
    assert_eq!(t.rows[0].1, vec![0.0, 1.0, 2.0]);
}

#[test]
fn non_numeric_cell_reports_line() {
    let err = parse_table("0 1 2\n0 one 2\n", false).unwrap_err();
    assert_eq!(err.0, 2);
    assert!(err.1.contains("one"));
}

#[test]
fn missing_file_is_io_error() {
    let err = read_table(Path::new("target/does-not-exist.asc"), false).unwrap_err();
    assert!(matches!(err, VisError::Other(_)));
}
