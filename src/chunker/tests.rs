use super::*;

const SECTION_NAME: &str = "البرامج الهندسية والطبية المعتمدة للعام الأكاديمي ٢٠٢٥";

fn sample_document() -> String {
    [
        "ملاحظات عامة:",
        "يجب على الطلبة مراجعة شروط القبول لكل برنامج قبل التقديم عبر البوابة الإلكترونية.",
        &format!("القسم: {SECTION_NAME}"),
        "اسم البرنامج: هندسة معمارية",
        "رمز البرنامج: BS140",
        "المؤسسة التعليمية: جامعة ظفار",
        "الشروط: معدل لا يقل عن 80 بالمئة في الرياضيات والفيزياء",
        "-----",
        "اسم البرنامج: طب",
        "رمز البرنامج: SQ959",
        "المؤسسة التعليمية: جامعة السلطان قابوس",
        "الشروط: معدل لا يقل عن 90 بالمئة في الأحياء والكيمياء",
    ]
    .join("\n")
}

/// Records laid out one per line with the name label in the middle of the
/// line, which the primary split cannot see as record boundaries.
fn inline_records_document() -> String {
    (1..=12)
        .map(|i| {
            format!(
                "البند {i}: اسم البرنامج: تخصص هندسي رقم {i} / رمز البرنامج: EN{} / المؤسسة التعليمية: كلية الهندسة",
                100 + i
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn chunks_notes_sections_and_programs() {
    let chunks = chunk_document(&sample_document(), &ChunkingConfig::default());

    let types: Vec<ChunkType> = chunks.iter().map(|c| c.metadata.chunk_type).collect();
    assert_eq!(
        types,
        vec![
            ChunkType::OrganizationalNotes,
            ChunkType::SectionHeader,
            ChunkType::Program,
            ChunkType::Program,
        ]
    );

    assert!(chunks[0].content.starts_with("ملاحظات عامة"));
    assert_eq!(chunks[1].metadata.section.as_deref(), Some(SECTION_NAME));

    let architecture = &chunks[2].metadata;
    assert_eq!(architecture.program_name.as_deref(), Some("هندسة معمارية"));
    assert_eq!(architecture.program_code.as_deref(), Some("BS140"));
    assert_eq!(architecture.institution.as_deref(), Some("جامعة ظفار"));
    assert_eq!(architecture.section.as_deref(), Some(SECTION_NAME));

    let medicine = &chunks[3].metadata;
    assert_eq!(medicine.program_name.as_deref(), Some("طب"));
    assert_eq!(medicine.program_code.as_deref(), Some("SQ959"));
    assert!(!chunks[3].content.contains("-----"));
}

#[test]
fn chunk_indices_are_contiguous() {
    let chunks = chunk_document(&sample_document(), &ChunkingConfig::default());

    for (expected, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.metadata.chunk_index as usize, expected);
    }
}

#[test]
fn chunking_is_deterministic() {
    let config = ChunkingConfig::default();
    let document = sample_document();

    assert_eq!(chunk_document(&document, &config), chunk_document(&document, &config));
}

#[test]
fn program_chunks_always_have_name_or_code() {
    let mut document = sample_document();
    document.push_str("\n-----\nهذه فقرة طويلة لا تحتوي على أي اسم أو رمز لبرنامج دراسي ويجب تجاهلها تماما عند التقسيم.");

    let chunks = chunk_document(&document, &ChunkingConfig::default());

    assert_eq!(chunks.len(), 4);
    for chunk in chunks.iter().filter(|c| c.metadata.chunk_type == ChunkType::Program) {
        assert!(chunk.metadata.program_name.is_some() || chunk.metadata.program_code.is_some());
    }
}

#[test]
fn short_blocks_are_discarded() {
    let document = "اسم البرنامج: طب\n-----\nاسم البرنامج: صيدلة";

    assert!(chunk_document(document, &ChunkingConfig::default()).is_empty());
}

#[test]
fn primary_split_misses_inline_records() {
    let primary = primary_split(&inline_records_document(), &ChunkingConfig::default());

    assert_eq!(primary.len(), 1);
}

#[test]
fn line_by_line_split_recovers_inline_records() {
    let chunks = chunk_document(&inline_records_document(), &ChunkingConfig::default());

    assert_eq!(chunks.len(), 12);
    let codes: Vec<String> = chunks
        .iter()
        .filter_map(|c| c.metadata.program_code.clone())
        .collect();
    let expected: Vec<String> = (101..=112).map(|n| format!("EN{n}")).collect();
    assert_eq!(codes, expected);
    assert_eq!(chunks[0].metadata.program_name.as_deref(), Some("تخصص هندسي رقم 1"));
}

#[test]
fn long_program_chunks_are_split_with_shared_metadata() {
    let config = ChunkingConfig {
        max_chunk_chars: 200,
        target_chunk_chars: 150,
        overlap_chars: 20,
        boundary_window_chars: 40,
        ..ChunkingConfig::default()
    };
    let document = format!(
        "اسم البرنامج: هندسة مدنية\nرمز البرنامج: EN210\n{}",
        "يشترط اجتياز اختبار القبول في الرياضيات. ".repeat(20)
    );

    let chunks = chunk_document(&document, &config);

    assert!(chunks.len() > 1);
    for (index, chunk) in chunks.iter().enumerate() {
        assert!(chunk.content.chars().count() <= config.max_chunk_chars);
        assert_eq!(chunk.metadata.program_code.as_deref(), Some("EN210"));
        assert_eq!(chunk.metadata.chunk_index as usize, index);
    }
}

#[test]
fn long_chunks_are_kept_whole_when_splitting_disabled() {
    let config = ChunkingConfig {
        max_chunk_chars: 200,
        target_chunk_chars: 150,
        overlap_chars: 20,
        boundary_window_chars: 40,
        split_long_chunks: false,
        ..ChunkingConfig::default()
    };
    let document = format!(
        "اسم البرنامج: هندسة مدنية\n{}",
        "يشترط اجتياز اختبار القبول في الرياضيات. ".repeat(20)
    );

    assert_eq!(chunk_document(&document, &config).len(), 1);
}

#[test]
fn windows_line_endings_are_normalized() {
    let document = sample_document().replace('\n', "\r\n");

    let chunks = chunk_document(&document, &ChunkingConfig::default());

    assert_eq!(chunks.len(), 4);
    assert!(chunks.iter().all(|c| !c.content.contains('\r')));
}

#[test]
fn section_lines_need_a_separator_after_the_label() {
    assert_eq!(section_name("Section: Engineering").as_deref(), Some("Engineering"));
    assert_eq!(section_name("القسم الأول - العلوم").as_deref(), Some("الأول - العلوم"));
    assert_eq!(section_name("قسمت الجامعة البرامج إلى فئات"), None);
    assert_eq!(section_name("قسم"), None);
}

#[test]
fn chunk_type_round_trips_through_str() {
    for chunk_type in [
        ChunkType::OrganizationalNotes,
        ChunkType::SectionHeader,
        ChunkType::Program,
    ] {
        assert_eq!(chunk_type.as_str().parse::<ChunkType>().expect("known type"), chunk_type);
    }
    assert!("unknown".parse::<ChunkType>().is_err());
}

/// Notes preamble plus nine name-led records, the first of which also holds
/// a second program introduced only by its code line
fn nine_records_with_hidden_program() -> String {
    let mut lines = vec![
        "ملاحظات: يرجى مراجعة شروط القبول لكل برنامج قبل تقديم الطلب عبر البوابة الإلكترونية.".to_string(),
        String::new(),
    ];
    for i in 1..=9 {
        lines.push(format!("اسم البرنامج: تخصص رقم {i}"));
        lines.push(format!("رمز البرنامج: EN{}", 100 + i));
        lines.push("المؤسسة التعليمية: كلية الهندسة والتقنية".to_string());
        if i == 1 {
            lines.push("رمز البرنامج: XY201".to_string());
            lines.push("المؤسسة التعليمية: جامعة صحار".to_string());
            lines.push("يشترط معدل ٧٥٪ في الرياضيات.".to_string());
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

#[test]
fn notes_chunk_does_not_count_toward_fallback_threshold() {
    let chunks = chunk_document(&nine_records_with_hidden_program(), &ChunkingConfig::default());

    assert_eq!(chunks[0].metadata.chunk_type, ChunkType::OrganizationalNotes);
    let codes: Vec<&str> = chunks
        .iter()
        .filter_map(|c| c.metadata.program_code.as_deref())
        .collect();
    assert_eq!(codes.len(), 10);
    assert!(codes.contains(&"XY201"));
}

#[test]
fn target_length_above_max_still_splits_long_chunks() {
    let config = ChunkingConfig {
        max_chunk_chars: 200,
        target_chunk_chars: 900,
        overlap_chars: 20,
        boundary_window_chars: 40,
        ..ChunkingConfig::default()
    };
    let document = format!(
        "اسم البرنامج: هندسة مدنية\nرمز البرنامج: EN210\n{}",
        "يشترط اجتياز اختبار القبول في الرياضيات. ".repeat(20)
    );

    let chunks = chunk_document(&document, &config);

    assert!(chunks.len() > 1);
    for chunk in &chunks {
        assert!(chunk.content.chars().count() <= config.max_chunk_chars);
        assert_eq!(chunk.metadata.program_code.as_deref(), Some("EN210"));
    }
}

#[test]
fn one_line_records_need_a_lower_block_minimum() {
    let document = "\
اسم البرنامج: هندسة معمارية / رمز البرنامج: BS140 / المؤسسة التعليمية: جامعة ظفار

اسم البرنامج: طب / رمز البرنامج: SQ959
";
    let codes = |config: &ChunkingConfig| -> Vec<Option<String>> {
        chunk_document(document, config)
            .into_iter()
            .map(|chunk| chunk.metadata.program_code)
            .collect()
    };

    assert!(!codes(&ChunkingConfig::default()).contains(&Some("SQ959".to_string())));

    let lowered = ChunkingConfig {
        min_block_chars: 20,
        ..ChunkingConfig::default()
    };
    assert_eq!(
        codes(&lowered),
        vec![Some("BS140".to_string()), Some("SQ959".to_string())]
    );
}
