use super::*;

#[test]
fn extracts_fields_from_labelled_lines() {
    let block = "اسم البرنامج: هندسة معمارية\nرمز البرنامج: BS140\nالمؤسسة التعليمية: جامعة ظفار\nمدة الدراسة: خمس سنوات";

    let fields = extract_program_fields(block);

    assert_eq!(fields.name.as_deref(), Some("هندسة معمارية"));
    assert_eq!(fields.code.as_deref(), Some("BS140"));
    assert_eq!(fields.institution.as_deref(), Some("جامعة ظفار"));
    assert!(fields.is_identified());
}

#[test]
fn extracts_fields_from_single_line_record() {
    let block = "اسم البرنامج: هندسة معمارية / رمز البرنامج: BS140 / المؤسسة التعليمية: جامعة ظفار";

    let fields = extract_program_fields(block);

    assert_eq!(fields.name.as_deref(), Some("هندسة معمارية"));
    assert_eq!(fields.code.as_deref(), Some("BS140"));
    assert_eq!(fields.institution.as_deref(), Some("جامعة ظفار"));
}

#[test]
fn rejects_value_that_runs_into_another_label() {
    // No separator between the fields, so the name capture swallows the code label
    let block = "اسم البرنامج: طب رمز البرنامج: SQ959";

    assert_eq!(extract_program_name(block), None);
    assert_eq!(extract_program_code(block).as_deref(), Some("SQ959"));
}

#[test]
fn empty_label_does_not_borrow_next_line() {
    let block = "اسم البرنامج:\nرمز البرنامج: SQ959";

    assert_eq!(extract_program_name(block), None);
}

#[test]
fn english_labels_are_case_insensitive() {
    let block = "PROGRAM NAME: Computer Science\nProgram Code: CS201\nUniversity: Sultan Qaboos University";

    let fields = extract_program_fields(block);

    assert_eq!(fields.name.as_deref(), Some("Computer Science"));
    assert_eq!(fields.code.as_deref(), Some("CS201"));
    assert_eq!(fields.institution.as_deref(), Some("Sultan Qaboos University"));
}

#[test]
fn bare_code_is_last_resort() {
    let block = "برنامج بكالوريوس التمريض المقدم برمز NU310 للطلبة المستوفين للشروط";

    assert_eq!(extract_program_code(block).as_deref(), Some("NU310"));
}

#[test]
fn code_without_digit_is_rejected() {
    assert_eq!(extract_program_code("رمز البرنامج: ABCD"), None);
}

#[test]
fn unlabelled_text_leaves_fields_unset() {
    let fields = extract_program_fields("يرجى مراجعة دليل القبول قبل التسجيل في أي برنامج دراسي.");

    assert_eq!(fields, ProgramFields::default());
    assert!(!fields.is_identified());
}

#[test]
fn overlong_name_is_rejected() {
    let block = format!("اسم البرنامج: {}", "أ".repeat(MAX_TEXT_FIELD_CHARS + 1));

    assert_eq!(extract_program_name(&block), None);
}

#[test]
fn trailing_punctuation_is_trimmed() {
    assert_eq!(
        extract_program_name("اسم البرنامج: علوم الحاسب،").as_deref(),
        Some("علوم الحاسب")
    );
}

#[test]
fn fill_from_keeps_first_values() {
    let mut fields = ProgramFields {
        name: Some("طب".to_string()),
        code: None,
        institution: None,
    };
    fields.fill_from(ProgramFields {
        name: Some("صيدلة".to_string()),
        code: Some("SQ959".to_string()),
        institution: None,
    });

    assert_eq!(fields.name.as_deref(), Some("طب"));
    assert_eq!(fields.code.as_deref(), Some("SQ959"));
}

#[test]
fn detects_field_labels() {
    assert!(contains_field_label("x / رمز البرنامج: BS140"));
    assert!(contains_field_label("Institution : foo"));
    assert!(!contains_field_label("هندسة معمارية"));
}
