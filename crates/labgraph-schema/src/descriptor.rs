//! Per-kind entity descriptors.
//!
//! The ingestion loop is generic; everything kind-specific lives here as
//! data: field rules, the scoped natural-key definition, parent links,
//! whitelist updates and derived attributes. A descriptor never touches the
//! store; the engine interprets it.
//!
//! Scope model
//! -----------
//! A natural key is unique only within a scope defined by ancestors. The
//! scope is a **conjunction** of constraints; each constraint is a
//! **disjunction** of ancestor paths (the union the dual-parentage kinds
//! need); each path is a sequence of hops from the candidate outward, where
//! a hop names the relation, the parent kind, and the parent attributes that
//! must equal row values. A candidate survives a constraint when at least
//! one path instance survives every hop.

use crate::fields::{
    EnumField, FieldRules, PrefixField, RequiredUnlessPrefix, RequiredWhen,
    EXTERNAL_PLATE_PREFIX, EXTRACTION_FROM_VALUES, PCR_RESULTS, PLATE_PREFIXES, SEQUENCING_TYPES,
};
use crate::{EntityKind, RelKind};

/// How a row value is canonicalized before it is stored or compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueClass {
    Text,
    /// Day/month/year in the row, ISO in the store.
    Date,
}

/// One attribute-to-row-field equality, used both for own natural keys and
/// for ancestor filters inside scope hops.
#[derive(Debug, Clone)]
pub struct FieldMatch {
    /// Attribute name on the entity.
    pub attr: &'static str,
    /// Row field supplying the value.
    pub field: &'static str,
    pub class: ValueClass,
}

fn key(name: &'static str) -> FieldMatch {
    FieldMatch {
        attr: name,
        field: name,
        class: ValueClass::Text,
    }
}

fn date_key(name: &'static str) -> FieldMatch {
    FieldMatch {
        attr: name,
        field: name,
        class: ValueClass::Date,
    }
}

fn key_as(attr: &'static str, field: &'static str) -> FieldMatch {
    FieldMatch {
        attr,
        field,
        class: ValueClass::Text,
    }
}

/// One hop outward from the candidate: child --rel--> parent of `parent`
/// kind, with `filters` matched against the row.
#[derive(Debug, Clone)]
pub struct Hop {
    pub rel: RelKind,
    pub parent: EntityKind,
    pub filters: Vec<FieldMatch>,
}

fn hop(rel: RelKind, parent: EntityKind, filters: Vec<FieldMatch>) -> Hop {
    Hop {
        rel,
        parent,
        filters,
    }
}

#[derive(Debug, Clone)]
pub struct ScopePath {
    pub hops: Vec<Hop>,
}

#[derive(Debug, Clone)]
pub struct ScopeConstraint {
    pub paths: Vec<ScopePath>,
}

/// Scoped natural-key definition.
#[derive(Debug, Clone, Default)]
pub struct KeySpec {
    pub own: Vec<FieldMatch>,
    pub scope: Vec<ScopeConstraint>,
}

/// How the parent(s) of a new entity are found.
#[derive(Debug, Clone)]
pub enum ParentSelector {
    /// Resolve the parent kind with its own descriptor against this row.
    Fixed(EntityKind),
    /// Tagged union: the discriminator field picks the parent kind.
    Discriminated {
        field: &'static str,
        arms: Vec<(&'static str, EntityKind)>,
    },
    /// The row field is a ';'-separated list; each element is substituted
    /// into `item_field` and the parent resolved with its own descriptor.
    Multi {
        field: &'static str,
        parent: EntityKind,
        item_field: &'static str,
    },
    /// Resolve with an explicit child-local key, for rows that do not carry
    /// the parent's canonical field names.
    ByKey { parent: EntityKind, key: KeySpec },
}

#[derive(Debug, Clone)]
pub struct ParentSpec {
    pub rel: RelKind,
    pub selector: ParentSelector,
}

/// After-the-fact updates allowed on an existing entity. Everything else on
/// a resolved row is a reported no-op.
#[derive(Debug, Clone)]
pub enum UpdateRule {
    /// Flip a stored boolean attribute false -> true when the row field is
    /// a yes-spelling. Never flips back.
    FlipTrue {
        attr: &'static str,
        field: &'static str,
    },
    /// Set the attribute from the row when the entity does not have it yet.
    /// Never overwrites.
    SetIfAbsent {
        attr: &'static str,
        field: &'static str,
    },
    /// Link the entity to additional Multi-selector parents named by the
    /// row (a sample source gaining a project).
    ExtendMultiParents,
}

/// Attributes the builder computes rather than copies.
#[derive(Debug, Clone)]
pub enum DerivedField {
    /// Join the present row fields with `sep` (readset display names).
    Compose {
        attr: &'static str,
        fields: Vec<&'static str>,
        sep: char,
    },
    /// Normalize a yes/no request field into a stored boolean.
    YesNoFlag {
        attr: &'static str,
        field: &'static str,
    },
    /// `nanopore` when a barcode is present, `illumina` otherwise.
    Technology { attr: &'static str },
}

/// Everything the generic ingestion loop needs for one entity kind.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    pub kind: EntityKind,
    pub rules: FieldRules,
    pub key: KeySpec,
    /// Row fields persisted as attributes (dates canonicalized).
    pub stored: Vec<&'static str>,
    pub parents: Vec<ParentSpec>,
    pub updates: Vec<UpdateRule>,
    pub derived: Vec<DerivedField>,
}

/// The implicit RawSequencing record has no rows of its own; readset
/// ingestion resolves-or-creates it with this spec.
#[derive(Debug, Clone)]
pub struct RawSequencingSpec {
    pub key: KeySpec,
    pub parents: Vec<ParentSpec>,
}

// ============================================================================
// Shared path fragments
// ============================================================================

/// Sample -> SampleSource -> Project -> Group, filtering the group key.
fn group_tail() -> Vec<Hop> {
    vec![
        hop(RelKind::CollectedFrom, EntityKind::SampleSource, vec![]),
        hop(RelKind::SourcedBy, EntityKind::Project, vec![]),
        hop(
            RelKind::MemberOf,
            EntityKind::Group,
            vec![key("group_name"), key("institution")],
        ),
    ]
}

/// `prefix` must end on an Extraction hop (or be empty when the candidate is
/// the extraction). Returns the whole-sample and cultured-isolate variants
/// down to the filtered Sample and Group.
fn dual_sample_paths(prefix: Vec<Hop>) -> Vec<ScopePath> {
    let mut whole = prefix.clone();
    whole.push(hop(
        RelKind::ExtractedFrom,
        EntityKind::Sample,
        vec![key("sample_identifier")],
    ));
    whole.extend(group_tail());

    let mut cultured = prefix;
    cultured.push(hop(RelKind::ExtractedFrom, EntityKind::Culture, vec![]));
    cultured.push(hop(
        RelKind::CulturedFrom,
        EntityKind::Sample,
        vec![key("sample_identifier")],
    ));
    cultured.extend(group_tail());

    vec![ScopePath { hops: whole }, ScopePath { hops: cultured }]
}

/// Which RawSequencing parentage variants a path disjunction must cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SequencingModes {
    Standard,
    Covid,
    /// Downstream consumers do not know which pipeline produced the data.
    Both,
}

/// `prefix` must end on a RawSequencing hop. Expands through Extraction
/// directly and/or through TilingPcr, then down both sample paths.
fn raw_sequencing_sample_paths(
    prefix: Vec<Hop>,
    extraction_filters: Vec<FieldMatch>,
    pcr_filters: Vec<FieldMatch>,
    modes: SequencingModes,
) -> Vec<ScopePath> {
    let mut paths = Vec::new();
    if modes != SequencingModes::Covid {
        let mut direct = prefix.clone();
        direct.push(hop(
            RelKind::SequencingOf,
            EntityKind::Extraction,
            extraction_filters.clone(),
        ));
        paths.extend(dual_sample_paths(direct));
    }
    if modes != SequencingModes::Standard {
        let mut tiled = prefix;
        tiled.push(hop(
            RelKind::SequencingOf,
            EntityKind::TilingPcr,
            pcr_filters,
        ));
        tiled.push(hop(RelKind::PcrOf, EntityKind::Extraction, vec![]));
        paths.extend(dual_sample_paths(tiled));
    }
    paths
}

fn extraction_row_filters() -> Vec<FieldMatch> {
    vec![key("extraction_identifier"), date_key("date_extracted")]
}

fn tiling_pcr_row_filters() -> Vec<FieldMatch> {
    vec![key("pcr_identifier"), date_key("date_pcred")]
}

/// ReadSet addressed the way downstream result rows address it: by readset
/// batch plus the transitive sample/group union.
fn readset_by_sample_key() -> KeySpec {
    KeySpec {
        own: vec![],
        scope: vec![
            ScopeConstraint {
                paths: vec![ScopePath {
                    hops: vec![hop(
                        RelKind::ReadsetIn,
                        EntityKind::ReadSetBatch,
                        vec![key("readset_batch_name")],
                    )],
                }],
            },
            ScopeConstraint {
                paths: raw_sequencing_sample_paths(
                    vec![hop(RelKind::ReadsetOf, EntityKind::RawSequencing, vec![])],
                    vec![],
                    vec![],
                    SequencingModes::Both,
                ),
            },
        ],
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Descriptor for a loadable kind. RawSequencing is implicit (see
/// [`raw_sequencing_spec`]); asking for it returns None.
pub fn descriptor(kind: EntityKind, covid: bool) -> Option<EntityDescriptor> {
    let d = match kind {
        EntityKind::Group => group(),
        EntityKind::Project => project(),
        EntityKind::SampleSource => sample_source(),
        EntityKind::Sample => sample(),
        EntityKind::Culture => culture(),
        EntityKind::Extraction => extraction(),
        EntityKind::TilingPcr => tiling_pcr(),
        EntityKind::CovidConfirmatoryPcr => covid_confirmatory_pcr(),
        EntityKind::PcrAssay => pcr_assay(),
        EntityKind::PcrResult => pcr_result(),
        EntityKind::RawSequencingBatch => raw_sequencing_batch(),
        EntityKind::RawSequencing => return None,
        EntityKind::ReadSetBatch => readset_batch(),
        EntityKind::ReadSet => readset(covid),
        EntityKind::ArticCovidResult => artic_covid_result(),
        EntityKind::PangolinResult => pangolin_result(),
        EntityKind::MykrobeResult => mykrobe_result(),
    };
    Some(d)
}

/// Key and parent links of the implicit RawSequencing record, per pipeline.
pub fn raw_sequencing_spec(covid: bool) -> RawSequencingSpec {
    let batch_constraint = ScopeConstraint {
        paths: vec![ScopePath {
            hops: vec![hop(
                RelKind::SequencedIn,
                EntityKind::RawSequencingBatch,
                vec![key_as("batch_name", "raw_sequencing_batch_name")],
            )],
        }],
    };
    let (mode, extraction_filters, pcr_filters) = if covid {
        (SequencingModes::Covid, vec![], tiling_pcr_row_filters())
    } else {
        (SequencingModes::Standard, extraction_row_filters(), vec![])
    };
    let source_constraint = ScopeConstraint {
        paths: raw_sequencing_sample_paths(vec![], extraction_filters, pcr_filters, mode),
    };

    let batch_parent = ParentSpec {
        rel: RelKind::SequencedIn,
        selector: ParentSelector::ByKey {
            parent: EntityKind::RawSequencingBatch,
            key: KeySpec {
                own: vec![key_as("batch_name", "raw_sequencing_batch_name")],
                scope: vec![],
            },
        },
    };
    let source_parent = if covid {
        ParentSpec {
            rel: RelKind::SequencingOf,
            selector: ParentSelector::ByKey {
                parent: EntityKind::TilingPcr,
                key: KeySpec {
                    own: tiling_pcr_row_filters(),
                    scope: vec![ScopeConstraint {
                        paths: dual_sample_paths(vec![hop(
                            RelKind::PcrOf,
                            EntityKind::Extraction,
                            vec![],
                        )]),
                    }],
                },
            },
        }
    } else {
        ParentSpec {
            rel: RelKind::SequencingOf,
            selector: ParentSelector::Fixed(EntityKind::Extraction),
        }
    };

    RawSequencingSpec {
        key: KeySpec {
            own: vec![],
            scope: vec![batch_constraint, source_constraint],
        },
        parents: vec![batch_parent, source_parent],
    }
}

// ----------------------------------------------------------------------
// Per-kind definitions
// ----------------------------------------------------------------------

fn group() -> EntityDescriptor {
    EntityDescriptor {
        kind: EntityKind::Group,
        rules: FieldRules {
            required: vec!["group_name", "institution"],
            optional: vec!["pi_name"],
            ..Default::default()
        },
        key: KeySpec {
            own: vec![key("group_name"), key("institution")],
            scope: vec![],
        },
        stored: vec!["group_name", "institution", "pi_name"],
        parents: vec![],
        updates: vec![],
        derived: vec![],
    }
}

fn project() -> EntityDescriptor {
    EntityDescriptor {
        kind: EntityKind::Project,
        rules: FieldRules {
            required: vec!["project_name", "group_name", "institution"],
            optional: vec!["project_details"],
            ..Default::default()
        },
        key: KeySpec {
            own: vec![key("project_name")],
            scope: vec![ScopeConstraint {
                paths: vec![ScopePath {
                    hops: vec![hop(
                        RelKind::MemberOf,
                        EntityKind::Group,
                        vec![key("group_name"), key("institution")],
                    )],
                }],
            }],
        },
        stored: vec!["project_name", "project_details"],
        parents: vec![ParentSpec {
            rel: RelKind::MemberOf,
            selector: ParentSelector::Fixed(EntityKind::Group),
        }],
        updates: vec![],
        derived: vec![],
    }
}

fn sample_source() -> EntityDescriptor {
    EntityDescriptor {
        kind: EntityKind::SampleSource,
        rules: FieldRules {
            required: vec![
                "sample_source_identifier",
                "sample_source_type",
                "projects",
                "group_name",
                "institution",
            ],
            optional: vec!["latitude", "longitude", "country", "city"],
            numerics: vec!["latitude", "longitude"],
            ..Default::default()
        },
        key: KeySpec {
            own: vec![key("sample_source_identifier")],
            scope: vec![ScopeConstraint {
                paths: vec![ScopePath {
                    hops: vec![
                        hop(RelKind::SourcedBy, EntityKind::Project, vec![]),
                        hop(
                            RelKind::MemberOf,
                            EntityKind::Group,
                            vec![key("group_name"), key("institution")],
                        ),
                    ],
                }],
            }],
        },
        stored: vec![
            "sample_source_identifier",
            "sample_source_type",
            "latitude",
            "longitude",
            "country",
            "city",
        ],
        parents: vec![ParentSpec {
            rel: RelKind::SourcedBy,
            selector: ParentSelector::Multi {
                field: "projects",
                parent: EntityKind::Project,
                item_field: "project_name",
            },
        }],
        updates: vec![UpdateRule::ExtendMultiParents],
        derived: vec![],
    }
}

fn sample() -> EntityDescriptor {
    EntityDescriptor {
        kind: EntityKind::Sample,
        rules: FieldRules {
            required: vec![
                "sample_identifier",
                "sample_source_identifier",
                "group_name",
                "institution",
            ],
            optional: vec![
                "species",
                "sample_type",
                "date_collected",
                "submitted_for_sequencing",
            ],
            dates: vec!["date_collected"],
            ..Default::default()
        },
        key: KeySpec {
            own: vec![key("sample_identifier")],
            scope: vec![ScopeConstraint {
                paths: vec![ScopePath {
                    hops: group_tail(),
                }],
            }],
        },
        stored: vec!["sample_identifier", "species", "sample_type", "date_collected"],
        parents: vec![ParentSpec {
            rel: RelKind::CollectedFrom,
            selector: ParentSelector::Fixed(EntityKind::SampleSource),
        }],
        updates: vec![UpdateRule::FlipTrue {
            attr: "submitted_for_sequencing",
            field: "submitted_for_sequencing",
        }],
        derived: vec![DerivedField::YesNoFlag {
            attr: "submitted_for_sequencing",
            field: "submitted_for_sequencing",
        }],
    }
}

fn culture() -> EntityDescriptor {
    EntityDescriptor {
        kind: EntityKind::Culture,
        rules: FieldRules {
            required: vec!["sample_identifier", "group_name", "institution"],
            optional: vec!["submitter_plate_id", "submitter_plate_well"],
            prefixes: vec![PrefixField {
                field: "submitter_plate_id",
                prefixes: &PLATE_PREFIXES,
            }],
            wells: vec!["submitter_plate_well"],
            dates: vec!["date_cultured"],
            skip_when_blank: vec!["culture_identifier", "date_cultured"],
            ..Default::default()
        },
        key: KeySpec {
            own: vec![key("culture_identifier"), date_key("date_cultured")],
            scope: vec![ScopeConstraint {
                paths: vec![ScopePath {
                    hops: {
                        let mut hops = vec![hop(
                            RelKind::CulturedFrom,
                            EntityKind::Sample,
                            vec![key("sample_identifier")],
                        )];
                        hops.extend(group_tail());
                        hops
                    },
                }],
            }],
        },
        stored: vec![
            "culture_identifier",
            "date_cultured",
            "submitter_plate_id",
            "submitter_plate_well",
        ],
        parents: vec![ParentSpec {
            rel: RelKind::CulturedFrom,
            selector: ParentSelector::Fixed(EntityKind::Sample),
        }],
        updates: vec![],
        derived: vec![],
    }
}

fn extraction() -> EntityDescriptor {
    EntityDescriptor {
        kind: EntityKind::Extraction,
        rules: FieldRules {
            required: vec![
                "sample_identifier",
                "group_name",
                "institution",
                "extraction_identifier",
                "date_extracted",
                "extraction_from",
                "submitter_plate_id",
                "submitter_plate_well",
            ],
            optional: vec![
                "extraction_machine",
                "extraction_kit",
                "what_was_extracted",
                "processing_institution",
                "elution_plate_id",
                "elution_plate_well",
            ],
            required_unless_prefix: vec![RequiredUnlessPrefix {
                field: "nucleic_acid_concentration",
                unless_field: "submitter_plate_id",
                unless_prefixes: &[EXTERNAL_PLATE_PREFIX],
            }],
            required_when: vec![
                RequiredWhen {
                    field: "culture_identifier",
                    when_field: "extraction_from",
                    equals: "cultured_isolate",
                },
                RequiredWhen {
                    field: "date_cultured",
                    when_field: "extraction_from",
                    equals: "cultured_isolate",
                },
            ],
            enums: vec![EnumField {
                field: "extraction_from",
                allowed: &EXTRACTION_FROM_VALUES,
            }],
            prefixes: vec![PrefixField {
                field: "submitter_plate_id",
                prefixes: &PLATE_PREFIXES,
            }],
            wells: vec!["submitter_plate_well", "elution_plate_well"],
            dates: vec!["date_extracted", "date_cultured"],
            numerics: vec!["nucleic_acid_concentration"],
            ..Default::default()
        },
        key: KeySpec {
            own: vec![key("extraction_identifier"), date_key("date_extracted")],
            scope: vec![ScopeConstraint {
                paths: dual_sample_paths(vec![]),
            }],
        },
        stored: vec![
            "extraction_identifier",
            "date_extracted",
            "extraction_from",
            "submitter_plate_id",
            "submitter_plate_well",
            "nucleic_acid_concentration",
            "extraction_machine",
            "extraction_kit",
            "what_was_extracted",
            "processing_institution",
            "elution_plate_id",
            "elution_plate_well",
        ],
        parents: vec![ParentSpec {
            rel: RelKind::ExtractedFrom,
            selector: ParentSelector::Discriminated {
                field: "extraction_from",
                arms: vec![
                    ("whole_sample", EntityKind::Sample),
                    ("cultured_isolate", EntityKind::Culture),
                ],
            },
        }],
        updates: vec![
            UpdateRule::SetIfAbsent {
                attr: "elution_plate_id",
                field: "elution_plate_id",
            },
            UpdateRule::SetIfAbsent {
                attr: "elution_plate_well",
                field: "elution_plate_well",
            },
        ],
        derived: vec![],
    }
}

fn tiling_pcr() -> EntityDescriptor {
    EntityDescriptor {
        kind: EntityKind::TilingPcr,
        rules: FieldRules {
            required: vec![
                "sample_identifier",
                "group_name",
                "institution",
                "extraction_identifier",
                "date_extracted",
                "pcr_identifier",
                "date_pcred",
            ],
            optional: vec!["protocol", "number_of_cycles"],
            dates: vec!["date_extracted", "date_pcred"],
            counts: vec!["number_of_cycles"],
            ..Default::default()
        },
        key: KeySpec {
            own: vec![key("pcr_identifier"), date_key("date_pcred")],
            scope: vec![ScopeConstraint {
                paths: dual_sample_paths(vec![hop(
                    RelKind::PcrOf,
                    EntityKind::Extraction,
                    extraction_row_filters(),
                )]),
            }],
        },
        stored: vec!["pcr_identifier", "date_pcred", "protocol", "number_of_cycles"],
        parents: vec![ParentSpec {
            rel: RelKind::PcrOf,
            selector: ParentSelector::Fixed(EntityKind::Extraction),
        }],
        updates: vec![],
        derived: vec![],
    }
}

fn covid_confirmatory_pcr() -> EntityDescriptor {
    EntityDescriptor {
        kind: EntityKind::CovidConfirmatoryPcr,
        rules: FieldRules {
            required: vec![
                "sample_identifier",
                "group_name",
                "institution",
                "extraction_identifier",
                "date_extracted",
            ],
            optional: vec!["protocol", "ct", "pcr_result"],
            enums: vec![EnumField {
                field: "pcr_result",
                allowed: &PCR_RESULTS,
            }],
            dates: vec!["date_extracted", "date_pcred"],
            numerics: vec!["ct"],
            skip_when_blank: vec!["pcr_identifier", "date_pcred"],
            ..Default::default()
        },
        key: KeySpec {
            own: vec![key("pcr_identifier"), date_key("date_pcred")],
            scope: vec![ScopeConstraint {
                paths: dual_sample_paths(vec![hop(
                    RelKind::PcrOf,
                    EntityKind::Extraction,
                    extraction_row_filters(),
                )]),
            }],
        },
        stored: vec!["pcr_identifier", "date_pcred", "protocol", "ct", "pcr_result"],
        parents: vec![ParentSpec {
            rel: RelKind::PcrOf,
            selector: ParentSelector::Fixed(EntityKind::Extraction),
        }],
        updates: vec![],
        derived: vec![],
    }
}

fn pcr_assay() -> EntityDescriptor {
    EntityDescriptor {
        kind: EntityKind::PcrAssay,
        rules: FieldRules {
            required: vec!["assay_name"],
            ..Default::default()
        },
        key: KeySpec {
            own: vec![key("assay_name")],
            scope: vec![],
        },
        stored: vec!["assay_name"],
        parents: vec![],
        updates: vec![],
        derived: vec![],
    }
}

fn pcr_result() -> EntityDescriptor {
    EntityDescriptor {
        kind: EntityKind::PcrResult,
        rules: FieldRules {
            required: vec![
                "sample_identifier",
                "group_name",
                "institution",
                "assay_name",
                "pcr_identifier",
                "date_pcred",
                "pcr_result",
            ],
            optional: vec!["ct"],
            enums: vec![EnumField {
                field: "pcr_result",
                allowed: &PCR_RESULTS,
            }],
            dates: vec!["date_pcred"],
            numerics: vec!["ct"],
            ..Default::default()
        },
        key: KeySpec {
            own: vec![key("pcr_identifier"), date_key("date_pcred")],
            scope: vec![
                ScopeConstraint {
                    paths: vec![ScopePath {
                        hops: vec![hop(
                            RelKind::ResultOfAssay,
                            EntityKind::PcrAssay,
                            vec![key("assay_name")],
                        )],
                    }],
                },
                ScopeConstraint {
                    paths: vec![ScopePath {
                        hops: {
                            let mut hops = vec![hop(
                                RelKind::ResultOfSample,
                                EntityKind::Sample,
                                vec![key("sample_identifier")],
                            )];
                            hops.extend(group_tail());
                            hops
                        },
                    }],
                },
            ],
        },
        stored: vec!["pcr_identifier", "date_pcred", "pcr_result", "ct"],
        parents: vec![
            ParentSpec {
                rel: RelKind::ResultOfSample,
                selector: ParentSelector::Fixed(EntityKind::Sample),
            },
            ParentSpec {
                rel: RelKind::ResultOfAssay,
                selector: ParentSelector::Fixed(EntityKind::PcrAssay),
            },
        ],
        updates: vec![],
        derived: vec![],
    }
}

fn raw_sequencing_batch() -> EntityDescriptor {
    EntityDescriptor {
        kind: EntityKind::RawSequencingBatch,
        rules: FieldRules {
            required: vec!["batch_name", "sequencing_type"],
            optional: vec![
                "date_run",
                "instrument_model",
                "instrument_name",
                "flowcell_type",
            ],
            enums: vec![EnumField {
                field: "sequencing_type",
                allowed: &SEQUENCING_TYPES,
            }],
            dates: vec!["date_run"],
            ..Default::default()
        },
        key: KeySpec {
            own: vec![key("batch_name")],
            scope: vec![],
        },
        stored: vec![
            "batch_name",
            "sequencing_type",
            "date_run",
            "instrument_model",
            "instrument_name",
            "flowcell_type",
        ],
        parents: vec![],
        updates: vec![],
        derived: vec![],
    }
}

fn readset_batch() -> EntityDescriptor {
    EntityDescriptor {
        kind: EntityKind::ReadSetBatch,
        rules: FieldRules {
            required: vec!["readset_batch_name", "raw_sequencing_batch_name"],
            optional: vec!["date_basecalled", "basecaller"],
            dates: vec!["date_basecalled"],
            ..Default::default()
        },
        key: KeySpec {
            own: vec![key("readset_batch_name")],
            scope: vec![],
        },
        stored: vec!["readset_batch_name", "date_basecalled", "basecaller"],
        parents: vec![ParentSpec {
            rel: RelKind::BasecalledFrom,
            selector: ParentSelector::ByKey {
                parent: EntityKind::RawSequencingBatch,
                key: KeySpec {
                    own: vec![key_as("batch_name", "raw_sequencing_batch_name")],
                    scope: vec![],
                },
            },
        }],
        updates: vec![],
        derived: vec![],
    }
}

fn readset(covid: bool) -> EntityDescriptor {
    let mut required = vec![
        "readset_batch_name",
        "raw_sequencing_batch_name",
        "sample_identifier",
        "group_name",
        "institution",
    ];
    let (mode, extraction_filters, pcr_filters) = if covid {
        required.extend(["pcr_identifier", "date_pcred"]);
        (SequencingModes::Covid, vec![], tiling_pcr_row_filters())
    } else {
        required.extend(["extraction_identifier", "date_extracted", "extraction_from"]);
        (SequencingModes::Standard, extraction_row_filters(), vec![])
    };
    let dates = if covid {
        vec!["date_pcred"]
    } else {
        vec!["date_extracted"]
    };

    EntityDescriptor {
        kind: EntityKind::ReadSet,
        rules: FieldRules {
            required,
            optional: vec!["barcode", "path_r1", "path_r2"],
            enums: if covid {
                vec![]
            } else {
                vec![EnumField {
                    field: "extraction_from",
                    allowed: &EXTRACTION_FROM_VALUES,
                }]
            },
            dates,
            one_of: vec![vec!["barcode"], vec!["path_r1", "path_r2"]],
            ..Default::default()
        },
        key: KeySpec {
            own: vec![],
            scope: vec![
                ScopeConstraint {
                    paths: vec![ScopePath {
                        hops: vec![hop(
                            RelKind::ReadsetIn,
                            EntityKind::ReadSetBatch,
                            vec![key("readset_batch_name")],
                        )],
                    }],
                },
                ScopeConstraint {
                    paths: raw_sequencing_sample_paths(
                        vec![hop(RelKind::ReadsetOf, EntityKind::RawSequencing, vec![])],
                        extraction_filters,
                        pcr_filters,
                        mode,
                    ),
                },
            ],
        },
        stored: vec!["barcode", "path_r1", "path_r2"],
        parents: vec![
            ParentSpec {
                rel: RelKind::ReadsetIn,
                selector: ParentSelector::Fixed(EntityKind::ReadSetBatch),
            },
            // The engine intercepts this one: RawSequencing is implicit and
            // is resolved-or-created with raw_sequencing_spec().
            ParentSpec {
                rel: RelKind::ReadsetOf,
                selector: ParentSelector::Fixed(EntityKind::RawSequencing),
            },
        ],
        updates: vec![],
        derived: vec![
            DerivedField::Technology { attr: "technology" },
            DerivedField::Compose {
                attr: "readset_name",
                fields: vec![
                    "readset_batch_name",
                    "sample_identifier",
                    "extraction_identifier",
                    "pcr_identifier",
                ],
                sep: '.',
            },
        ],
    }
}

fn artic_covid_result() -> EntityDescriptor {
    EntityDescriptor {
        kind: EntityKind::ArticCovidResult,
        rules: FieldRules {
            required: vec![
                "readset_batch_name",
                "barcode",
                "artic_workflow",
                "artic_profile",
            ],
            optional: vec!["pct_covered_bases", "num_aligned_reads"],
            numerics: vec!["pct_covered_bases", "num_aligned_reads"],
            ..Default::default()
        },
        key: KeySpec {
            own: vec![
                key("barcode"),
                key("artic_workflow"),
                key("artic_profile"),
            ],
            scope: vec![ScopeConstraint {
                paths: vec![ScopePath {
                    hops: vec![
                        hop(RelKind::ArticOf, EntityKind::ReadSet, vec![]),
                        hop(
                            RelKind::ReadsetIn,
                            EntityKind::ReadSetBatch,
                            vec![key("readset_batch_name")],
                        ),
                    ],
                }],
            }],
        },
        stored: vec![
            "barcode",
            "artic_workflow",
            "artic_profile",
            "pct_covered_bases",
            "num_aligned_reads",
        ],
        parents: vec![ParentSpec {
            rel: RelKind::ArticOf,
            selector: ParentSelector::ByKey {
                parent: EntityKind::ReadSet,
                key: KeySpec {
                    own: vec![key("barcode")],
                    scope: vec![ScopeConstraint {
                        paths: vec![ScopePath {
                            hops: vec![hop(
                                RelKind::ReadsetIn,
                                EntityKind::ReadSetBatch,
                                vec![key("readset_batch_name")],
                            )],
                        }],
                    }],
                },
            },
        }],
        updates: vec![],
        derived: vec![],
    }
}

fn pangolin_result() -> EntityDescriptor {
    let artic_key = KeySpec {
        own: vec![
            key("barcode"),
            key("artic_workflow"),
            key("artic_profile"),
        ],
        scope: vec![ScopeConstraint {
            paths: vec![ScopePath {
                hops: vec![
                    hop(RelKind::ArticOf, EntityKind::ReadSet, vec![]),
                    hop(
                        RelKind::ReadsetIn,
                        EntityKind::ReadSetBatch,
                        vec![key("readset_batch_name")],
                    ),
                ],
            }],
        }],
    };

    EntityDescriptor {
        kind: EntityKind::PangolinResult,
        rules: FieldRules {
            required: vec![
                "readset_batch_name",
                "barcode",
                "artic_workflow",
                "artic_profile",
                "version",
                "lineage",
            ],
            optional: vec!["conflict", "ambiguity_score"],
            numerics: vec!["ambiguity_score"],
            ..Default::default()
        },
        key: KeySpec {
            own: vec![key("version")],
            scope: vec![ScopeConstraint {
                paths: vec![ScopePath {
                    hops: vec![
                        hop(
                            RelKind::PangolinOf,
                            EntityKind::ArticCovidResult,
                            vec![
                                key("barcode"),
                                key("artic_workflow"),
                                key("artic_profile"),
                            ],
                        ),
                        hop(RelKind::ArticOf, EntityKind::ReadSet, vec![]),
                        hop(
                            RelKind::ReadsetIn,
                            EntityKind::ReadSetBatch,
                            vec![key("readset_batch_name")],
                        ),
                    ],
                }],
            }],
        },
        stored: vec!["version", "lineage", "conflict", "ambiguity_score"],
        parents: vec![ParentSpec {
            rel: RelKind::PangolinOf,
            selector: ParentSelector::ByKey {
                parent: EntityKind::ArticCovidResult,
                key: artic_key,
            },
        }],
        updates: vec![],
        derived: vec![],
    }
}

fn mykrobe_result() -> EntityDescriptor {
    EntityDescriptor {
        kind: EntityKind::MykrobeResult,
        rules: FieldRules {
            required: vec![
                "readset_batch_name",
                "sample_identifier",
                "group_name",
                "institution",
                "mykrobe_version",
                "drug",
            ],
            optional: vec!["susceptibility", "variants"],
            ..Default::default()
        },
        key: KeySpec {
            own: vec![key("mykrobe_version"), key("drug")],
            scope: vec![
                ScopeConstraint {
                    paths: vec![ScopePath {
                        hops: vec![
                            hop(RelKind::MykrobeOf, EntityKind::ReadSet, vec![]),
                            hop(
                                RelKind::ReadsetIn,
                                EntityKind::ReadSetBatch,
                                vec![key("readset_batch_name")],
                            ),
                        ],
                    }],
                },
                ScopeConstraint {
                    paths: raw_sequencing_sample_paths(
                        vec![
                            hop(RelKind::MykrobeOf, EntityKind::ReadSet, vec![]),
                            hop(RelKind::ReadsetOf, EntityKind::RawSequencing, vec![]),
                        ],
                        vec![],
                        vec![],
                        SequencingModes::Both,
                    ),
                },
            ],
        },
        stored: vec!["mykrobe_version", "drug", "susceptibility", "variants"],
        parents: vec![ParentSpec {
            rel: RelKind::MykrobeOf,
            selector: ParentSelector::ByKey {
                parent: EntityKind::ReadSet,
                key: readset_by_sample_key(),
            },
        }],
        updates: vec![],
        derived: vec![],
    }
}

// ============================================================================
// Tests
// ============================================================================
