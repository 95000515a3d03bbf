//! End-to-end properties of feature preparation and inference, run against
//! both a fixed-probability classifier and the bundled credit approval artifacts.

use loan_scoring_pipeline::error::{ErrorKind, PipelineError, Result};
use loan_scoring_pipeline::feature_pipeline::FeatureMatrix;
use loan_scoring_pipeline::models::classifier::{ClassProbabilities, Classifier};
use loan_scoring_pipeline::preprocessing::{OneHotEncoder, StandardScaler};
use loan_scoring_pipeline::schema::{FeatureSchema, CATEGORICAL_FIELDS, NUMERIC_FIELDS};
use loan_scoring_pipeline::scoring::RowOutcome;
use loan_scoring_pipeline::{
    ApplicationForm, ArtifactLoader, ArtifactSet, CsvBatch, Decision, LoanScorer, RawRecord,
};
use proptest::prelude::*;
use std::path::Path;
use std::sync::{Arc, OnceLock};

const INCOME_TYPES: &[&str] = &[
    "Commercial associate",
    "Pensioner",
    "State servant",
    "Student",
    "Working",
];
const EDUCATION: &[&str] = &[
    "Academic degree",
    "Higher education",
    "Incomplete higher",
    "Lower secondary",
    "Secondary / secondary special",
];
const MARITAL_STATUS: &[&str] = &[
    "Civil marriage",
    "Married",
    "Separated",
    "Single / not married",
    "Widow",
];
const HOUSING_TYPES: &[&str] = &[
    "Co-op apartment",
    "House / apartment",
    "Municipal apartment",
    "Office apartment",
    "Rented apartment",
    "With parents",
];

const CSV_HEADER: &str = "gender,car_owner,property_owner,children,annual_income,income_type,\
education,marital_status,housing_type,age,work_experience,mobile_phone,work_phone,phone,email,family_members";

/// Returns the same approval probability for every row
struct FixedClassifier {
    probability: f64,
    width: usize,
    threshold: f64,
}

impl Classifier for FixedClassifier {
    fn name(&self) -> &str {
        "fixed"
    }

    fn input_width(&self) -> Option<usize> {
        Some(self.width)
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<ClassProbabilities>> {
        Ok(features
            .rows()
            .map(|_| [1.0 - self.probability, self.probability])
            .collect())
    }

    fn decision_threshold(&self) -> f64 {
        self.threshold
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn stub_scorer(probability: f64, threshold: f64) -> LoanScorer {
    let encoder = OneHotEncoder::new(
        strings(&CATEGORICAL_FIELDS),
        vec![
            strings(&["F", "M"]),
            strings(&["N", "Y"]),
            strings(&["N", "Y"]),
            strings(&["Pensioner", "Working"]),
            strings(&["Higher education", "Secondary"]),
            strings(&["Married", "Single"]),
            strings(&["apartment", "house", "rented"]),
        ],
    )
    .unwrap();
    let scaler = StandardScaler::new(
        strings(&NUMERIC_FIELDS),
        vec![40.0, 100_000.0, 10.0],
        vec![10.0, 50_000.0, 5.0],
    )
    .unwrap();
    let artifacts = ArtifactSet::new(
        "stub",
        FeatureSchema::default(),
        Box::new(encoder),
        Box::new(scaler),
        Box::new(FixedClassifier {
            probability,
            width: 18,
            threshold,
        }),
    )
    .unwrap();
    LoanScorer::new(Arc::new(artifacts))
}

fn bundled_scorer() -> &'static LoanScorer {
    static SCORER: OnceLock<LoanScorer> = OnceLock::new();
    SCORER.get_or_init(|| {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("artifacts/credit-approval");
        let artifacts = ArtifactLoader::new().load_bundle(dir).unwrap();
        LoanScorer::new(Arc::new(artifacts))
    })
}

fn form(
    categorical: [&str; 7],
    age: i64,
    annual_income: f64,
    work_experience: i64,
) -> ApplicationForm {
    let [gender, car_owner, property_owner, income_type, education, marital_status, housing_type] =
        categorical;
    ApplicationForm {
        application_id: None,
        gender: gender.to_string(),
        car_owner: car_owner.to_string(),
        property_owner: property_owner.to_string(),
        children: 0,
        annual_income,
        income_type: income_type.to_string(),
        education: education.to_string(),
        marital_status: marital_status.to_string(),
        housing_type: housing_type.to_string(),
        age,
        work_experience,
        mobile_phone: 1,
        work_phone: 0,
        phone: 0,
        email: 0,
        family_members: 2,
    }
}

fn csv_row(form: &ApplicationForm) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
        form.gender,
        form.car_owner,
        form.property_owner,
        form.children,
        form.annual_income,
        form.income_type,
        form.education,
        form.marital_status,
        form.housing_type,
        form.age,
        form.work_experience,
        form.mobile_phone,
        form.work_phone,
        form.phone,
        form.email,
        form.family_members
    )
}

fn csv_batch(forms: &[ApplicationForm]) -> CsvBatch {
    let mut text = format!("{CSV_HEADER}\n");
    for form in forms {
        text.push_str(&csv_row(form));
        text.push('\n');
    }
    CsvBatch::from_reader(text.as_bytes()).unwrap()
}

fn application() -> impl Strategy<Value = ApplicationForm> {
    (
        (
            prop::sample::select(vec!["F", "M"]),
            prop::sample::select(vec!["N", "Y"]),
            prop::sample::select(vec!["N", "Y"]),
            prop::sample::select(INCOME_TYPES.to_vec()),
            prop::sample::select(EDUCATION.to_vec()),
            prop::sample::select(MARITAL_STATUS.to_vec()),
            prop::sample::select(HOUSING_TYPES.to_vec()),
        ),
        18i64..70,
        10_000.0f64..1_000_000.0,
        0i64..45,
        0i64..5,
    )
        .prop_map(|((g, c, p, it, ed, ms, ht), age, income, experience, children)| {
            let mut form = form([g, c, p, it, ed, ms, ht], age, income, experience);
            form.children = children;
            form.family_members = children + 1;
            form
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_batch_preserves_row_order(forms in prop::collection::vec(application(), 0..16)) {
        let scorer = bundled_scorer();
        let records: Vec<RawRecord> = forms.iter().map(ApplicationForm::to_record).collect();

        let batch = scorer.score_records(&records).unwrap();
        prop_assert_eq!(batch.len(), forms.len());
        for (form, from_batch) in forms.iter().zip(&batch) {
            let alone = scorer.score_application(form).unwrap();
            prop_assert_eq!(&alone, from_batch);
        }
    }

    #[test]
    fn prop_scoring_is_deterministic(form in application()) {
        let scorer = bundled_scorer();
        let first = scorer.score_application(&form).unwrap();
        let second = scorer.score_application(&form).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_probability_in_unit_range(forms in prop::collection::vec(application(), 1..16)) {
        let scorer = bundled_scorer();
        let records: Vec<RawRecord> = forms.iter().map(ApplicationForm::to_record).collect();
        let features = scorer.pipeline().prepare(&records).unwrap();
        let predictions = scorer.engine().infer(&features).unwrap();

        prop_assert_eq!(predictions.labels.len(), records.len());
        prop_assert_eq!(predictions.probabilities.len(), records.len());
        for p in &predictions.probabilities {
            prop_assert!((0.0..=1.0).contains(p));
        }
    }

    #[test]
    fn prop_label_matches_threshold(forms in prop::collection::vec(application(), 1..16)) {
        let scorer = bundled_scorer();
        let threshold = scorer.engine().decision_threshold();
        let records: Vec<RawRecord> = forms.iter().map(ApplicationForm::to_record).collect();
        let predictions = scorer.engine().infer(&scorer.pipeline().prepare(&records).unwrap()).unwrap();

        for (label, p) in predictions.labels.iter().zip(&predictions.probabilities) {
            prop_assert_eq!(*label == 1, *p > threshold);
        }
    }

    #[test]
    fn prop_batch_reports_percent_of_single_probability(forms in prop::collection::vec(application(), 1..8)) {
        let scorer = bundled_scorer();
        let report = scorer.score_batch(&csv_batch(&forms)).unwrap();
        let rows = report.output_rows();
        let probability_column = CSV_HEADER.split(',').count() + 1;

        for (i, form) in forms.iter().enumerate() {
            let single = scorer.score_application(form).unwrap();
            prop_assert!((0.0..=1.0).contains(&single.probability));
            prop_assert_eq!(
                &rows[i][probability_column],
                &format!("{:.2}%", single.probability * 100.0)
            );
        }
    }
}

#[test]
fn test_fixed_stub_single_application() {
    let scorer = stub_scorer(0.82, 0.5);
    let application = form(
        ["F", "N", "Y", "Working", "Higher education", "Married", "house"],
        35,
        50_000.0,
        10,
    );

    let result = scorer.score_application(&application).unwrap();
    assert_eq!(result.decision, Decision::Approved);
    assert_eq!(result.decision.to_string(), "Approved");
    assert_eq!(result.probability, 0.82);
}

#[test]
fn test_custom_threshold_drives_label() {
    let application = form(
        ["M", "Y", "N", "Pensioner", "Secondary", "Single", "rented"],
        61,
        30_000.0,
        0,
    );

    let lenient = stub_scorer(0.6, 0.5).score_application(&application).unwrap();
    let strict = stub_scorer(0.6, 0.7).score_application(&application).unwrap();
    assert_eq!(lenient.decision, Decision::Approved);
    assert_eq!(strict.decision, Decision::Denied);
    assert_eq!(strict.probability, 0.6);
}

#[test]
fn test_empty_batch_is_empty_result() {
    let batch = CsvBatch::from_reader(format!("{CSV_HEADER}\n").as_bytes()).unwrap();

    let report = bundled_scorer().score_batch(&batch).unwrap();
    assert!(report.is_empty());
    assert!(bundled_scorer().score_records(&[]).unwrap().is_empty());
}

#[test]
fn test_header_without_model_columns_is_rejected() {
    let batch = CsvBatch::from_reader("foo,bar\n".as_bytes()).unwrap();

    let err = bundled_scorer().score_batch(&batch).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.field(), Some("gender"));
    assert!(matches!(err, PipelineError::MissingField { .. }));
}

#[test]
fn test_unseen_category_is_encoding_error() {
    let application = form(
        ["F", "N", "Y", "Working", "Higher education", "Married", "spaceship"],
        35,
        50_000.0,
        10,
    );

    for scorer in [stub_scorer(0.82, 0.5), bundled_scorer().clone()] {
        let err = scorer.score_application(&application).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);
        assert_eq!(err.field(), Some("housing_type"));
    }
}

fn batch_with_text_in_row_two() -> CsvBatch {
    let good = form(
        ["F", "N", "Y", "Working", "Higher education", "Married", "House / apartment"],
        35,
        50_000.0,
        10,
    );
    let text = format!(
        "{CSV_HEADER}\n{}\n{}\n{}\n",
        csv_row(&good),
        csv_row(&good).replace(",35,", ",thirty-five,"),
        csv_row(&good),
    );
    CsvBatch::from_reader(text.as_bytes()).unwrap()
}

#[test]
fn test_bad_row_fails_whole_batch_by_default() {
    let err = bundled_scorer()
        .score_batch(&batch_with_text_in_row_two())
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.row(), Some(2));
    assert_eq!(err.field(), Some("age"));
    assert!(matches!(err, PipelineError::Row { row: 2, .. }));
}

#[test]
fn test_bad_row_isolated_when_enabled() {
    let scorer = bundled_scorer().clone().with_row_isolation(true);
    let report = scorer.score_batch(&batch_with_text_in_row_two()).unwrap();

    assert_eq!(report.len(), 3);
    assert_eq!(report.failed_count(), 1);
    let rows = report.rows();
    assert!(matches!(rows[0].outcome, RowOutcome::Scored(_)));
    assert!(matches!(&rows[1].outcome, RowOutcome::Failed(e) if e.row() == Some(2)));
    assert!(matches!(rows[2].outcome, RowOutcome::Scored(_)));
}

#[test]
fn test_bundled_model_separates_clear_cases() {
    let scorer = bundled_scorer();
    let strong = form(
        ["F", "Y", "Y", "Working", "Higher education", "Married", "House / apartment"],
        45,
        450_000.0,
        20,
    );
    let weak = form(
        ["M", "N", "N", "Student", "Lower secondary", "Single / not married", "Rented apartment"],
        21,
        40_000.0,
        0,
    );

    let strong = scorer.score_application(&strong).unwrap();
    let weak = scorer.score_application(&weak).unwrap();
    assert_eq!(strong.decision, Decision::Approved);
    assert_eq!(weak.decision, Decision::Denied);
    assert!(strong.probability > weak.probability);
}

#[test]
fn test_demo_batch_scores_every_row() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/applications.csv");
    let batch = CsvBatch::from_path(path).unwrap();

    let report = bundled_scorer().score_batch(&batch).unwrap();
    assert_eq!(report.len(), 5);
    assert_eq!(report.failed_count(), 0);

    let mut out = Vec::new();
    report.write_csv(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.lines().next().unwrap().ends_with(",Status,Probability"));
    assert_eq!(text.lines().count(), 6);
}
