use assert_matches::assert_matches;
use serde_json::json;

use genomic_dashboard_core::error::DashboardError;
use genomic_dashboard_core::mutation::{
    Deletion, Insertion, Mutation, MutationParseCache, Substitution, SubstitutionOrDeletion,
    compare_mutations,
};

#[test]
fn parse_segmented_substitution() {
    let mutation = Mutation::parse("S:E484K").unwrap();
    assert_eq!(
        mutation,
        Mutation::Substitution(Substitution::new(Some("S"), Some('E'), 484, Some('K')))
    );
    assert_eq!(mutation.code(), "S:E484K");
}

#[test]
fn parse_nucleotide_substitution_without_segment() {
    let mutation = Mutation::parse("A23403G").unwrap();
    assert_eq!(
        mutation,
        Mutation::Substitution(Substitution::new(None, Some('A'), 23403, Some('G')))
    );
    assert_eq!(mutation.segment(), None);
    assert_eq!(mutation.position(), 23403);
}

#[test]
fn parse_position_only_substitution() {
    let mutation = Mutation::parse("S:501").unwrap();
    assert_eq!(
        mutation,
        Mutation::Substitution(Substitution::new(Some("S"), None, 501, None))
    );
    assert_eq!(Mutation::parse("123").unwrap().code(), "123");
}

#[test]
fn parse_deletion_without_segment() {
    let mutation = Mutation::parse("A123-").unwrap();
    assert_eq!(mutation, Mutation::Deletion(Deletion::new(None, Some('A'), 123)));
    assert_eq!(mutation.type_name(), "deletion");
}

#[test]
fn amino_acid_deletion_needs_a_segment() {
    assert_eq!(
        Mutation::parse("ORF1a:F3677-").unwrap().code(),
        "ORF1a:F3677-"
    );
    assert!(Mutation::parse("F3677-").is_none());
}

#[test]
fn parse_segmented_insertion() {
    let mutation = Mutation::parse("ins_gene1:10:ACGT").unwrap();
    assert_eq!(
        mutation,
        Mutation::Insertion(Insertion::new(Some("gene1"), 10, "ACGT"))
    );
    assert_eq!(mutation.code(), "ins_gene1:10:ACGT");
}

#[test]
fn parse_insertion_with_wildcards() {
    let insertion = Insertion::parse("ins_22204:?.*GAG").unwrap();
    assert_eq!(insertion.segment, None);
    assert_eq!(insertion.position, 22204);
    assert_eq!(insertion.inserted_symbols, "?.*GAG");
    assert!(Insertion::parse("ins_22204:A.B").is_none());
}

#[test]
fn amino_acid_insertion_needs_a_segment() {
    assert!(Insertion::parse("ins_S:214:EPE").is_some());
    assert!(Insertion::parse("ins_214:EPE").is_none());
}

#[test]
fn parsing_is_case_insensitive_and_normalises_symbols() {
    let mutation = Mutation::parse("s:e484k").unwrap();
    assert_eq!(mutation.code(), "s:E484K");
    assert_eq!(Mutation::parse("INS_10:acgt").unwrap().code(), "ins_10:ACGT");
}

#[test]
fn amino_acid_without_segment_is_opt_in() {
    assert!(Mutation::parse("E484K").is_none());
    assert!(Substitution::parse("E484K", false).is_none());
    assert_eq!(
        Substitution::parse("E484K", true).unwrap(),
        Substitution::new(None, Some('E'), 484, Some('K'))
    );
}

#[test]
fn stop_codon_is_an_amino_acid_symbol() {
    assert_eq!(Mutation::parse("ORF8:Q27*").unwrap().code(), "ORF8:Q27*");
}

#[test]
fn malformed_codes_do_not_parse() {
    for code in ["", "XYZ", "12A34", "A123--", "ins_:A", "ins_10", "S:", ":N501Y", "A-1"] {
        assert!(Mutation::parse(code).is_none(), "{code} should not parse");
    }
}

#[test]
fn codes_round_trip() {
    for code in [
        "S:N501Y",
        "A23403G",
        "C241T",
        "ORF1a:S3675-",
        "G28881-",
        "ins_22204:GAGCCAGAA",
        "ins_S:214:EPE",
        "N:R203",
    ] {
        assert_eq!(Mutation::parse(code).unwrap().code(), code);
    }
}

#[test]
fn from_str_reports_invalid_codes() {
    let err = "not-a-mutation".parse::<Mutation>().unwrap_err();
    assert_matches!(err, DashboardError::InvalidMutationCode(code) if code == "not-a-mutation");
}

#[test]
fn insertion_is_not_a_point_mutation() {
    let err = "ins_10:ACGT".parse::<SubstitutionOrDeletion>().unwrap_err();
    assert_matches!(err, DashboardError::UnexpectedMutationType { .. });
    assert!(SubstitutionOrDeletion::parse("ins_10:ACGT").is_none());
    assert_matches!(
        SubstitutionOrDeletion::parse("A123-"),
        Some(SubstitutionOrDeletion::Deletion(_))
    );
}

#[test]
fn display_prints_the_code() {
    let mutation: Mutation = "S:N501Y".parse().unwrap();
    assert_eq!(mutation.to_string(), "S:N501Y");
}

#[test]
fn mutations_serialise_with_a_type_tag() {
    let mutation = Mutation::parse("A123-").unwrap();
    assert_eq!(
        serde_json::to_value(&mutation).unwrap(),
        json!({
            "type": "deletion",
            "segment": null,
            "valueAtReference": "A",
            "position": 123
        })
    );
}

#[test]
fn compare_orders_by_segment_then_position() {
    let mut mutations = ["S:N501Y", "ORF1a:S3675-", "A23403G", "C241T", "S:E484K"]
        .into_iter()
        .map(|code| Mutation::parse(code).unwrap())
        .collect::<Vec<_>>();
    mutations.sort_by(compare_mutations);
    let codes = mutations.iter().map(Mutation::code).collect::<Vec<_>>();
    assert_eq!(
        codes,
        vec!["C241T", "A23403G", "ORF1a:S3675-", "S:E484K", "S:N501Y"]
    );
}

#[test]
fn parse_cache_memoizes_hits_and_misses() {
    let cache = MutationParseCache::new();
    assert!(cache.is_empty());
    let first = cache.parse("S:N501Y");
    let second = cache.parse("S:N501Y");
    assert_eq!(first, second);
    assert!(cache.parse("garbage").is_none());
    assert_eq!(cache.len(), 2);
}
