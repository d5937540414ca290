use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tabula_orm::{
    row, BaseModel, ConfigError, MemoryDriver, ModelConfig, ModelError, Row, RuleFilter, WriteOutcome,
};
use tabula_validation::{
    Data, FieldRules, MessageSet, RuleError, RuleGroup, RuleSet, ValidationConfig, ValidationErrors,
    ValidationService, Validator,
};

/// Wraps the stock validator and counts how often it actually runs
struct CountingValidator {
    inner: Validator,
    runs: Arc<AtomicUsize>,
}

impl CountingValidator {
    fn new(inner: Validator) -> (Self, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                runs: runs.clone(),
            },
            runs,
        )
    }
}

#[async_trait]
impl ValidationService for CountingValidator {
    fn reset(&mut self) {
        self.inner.reset();
    }

    fn set_rules(&mut self, rules: RuleSet, messages: MessageSet) {
        self.inner.set_rules(rules, messages);
    }

    async fn run(&mut self, data: &Data, group: Option<&str>, db_group: Option<&str>) -> Result<bool, RuleError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.inner.run(data, group, db_group).await
    }

    fn get_errors(&self) -> &ValidationErrors {
        self.inner.get_errors()
    }

    fn load_rule_group(&self, name: &str) -> Result<RuleGroup, RuleError> {
        self.inner.load_rule_group(name)
    }
}

fn users() -> ModelConfig {
    ModelConfig::new("users")
        .allowed_fields(["name", "email"])
        .rule("name", "required|min_length[3]")
        .rule("email", "required|valid_email")
}

fn users_model(config: ModelConfig) -> (BaseModel, Arc<MemoryDriver>, Arc<AtomicUsize>) {
    let driver = Arc::new(MemoryDriver::new());
    let (validator, runs) = CountingValidator::new(Validator::new());
    let model = BaseModel::new(config, driver.clone())
        .unwrap()
        .with_validator(validator);
    (model, driver, runs)
}

fn signup_rules() -> ValidationConfig {
    let mut rules = RuleSet::new();
    rules.insert("name".to_string(), FieldRules::from("required"));
    rules.insert("email".to_string(), FieldRules::from("required|valid_email"));

    let mut messages = MessageSet::new();
    messages.insert(
        "email".to_string(),
        BTreeMap::from([("required".to_string(), "Email is mandatory.".to_string())]),
    );
    ValidationConfig::new().with_group("signup", RuleGroup { rules, messages })
}

#[tokio::test]
async fn test_invalid_insert_is_rejected_with_errors() {
    let (mut model, driver, runs) = users_model(users());

    let outcome = model.insert(row! { "name" => "Jane" }, true).await.unwrap();

    assert_eq!(outcome, WriteOutcome::Rejected);
    assert!(driver.rows("users").is_empty());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(
        model.errors(false),
        BTreeMap::from([("email".to_string(), "The email field is required.".to_string())])
    );
    assert!(model.get_insert_id().is_none());
}

#[tokio::test]
async fn test_valid_insert_passes() {
    let (mut model, driver, _runs) = users_model(users());

    let outcome = model
        .insert(row! { "name" => "Jane", "email" => "jane@example.com" }, true)
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(driver.rows("users").len(), 1);
    assert!(model.errors(false).is_empty());
}

#[tokio::test]
async fn test_update_only_checks_present_fields() {
    let (mut model, driver, _runs) = users_model(users());
    driver.seed("users", "id", vec![row! { "id" => 1, "name" => "Jane", "email" => "jane@example.com" }]);

    assert!(model.update(1, row! { "name" => "Janet" }).await.unwrap());
    assert!(!model.update(1, row! { "name" => "J" }).await.unwrap());
    assert!(model.errors(false).contains_key("name"));
}

#[tokio::test]
async fn test_update_without_cleaning_checks_every_rule() {
    let (mut model, driver, _runs) = users_model(users().clean_validation_rules(false));
    driver.seed("users", "id", vec![row! { "id" => 1, "name" => "Jane", "email" => "jane@example.com" }]);

    assert!(!model.update(1, row! { "name" => "Janet" }).await.unwrap());
    assert!(model.errors(false).contains_key("email"));
}

#[tokio::test]
async fn test_insert_never_cleans_rules() {
    let (mut model, _driver, _runs) = users_model(users().clean_validation_rules(true));

    let outcome = model.insert(row! { "name" => "Janet" }, false).await.unwrap();
    assert_eq!(outcome, WriteOutcome::Rejected);
}

#[tokio::test]
async fn test_validator_is_not_run_without_work() {
    // skipped
    let (mut model, driver, runs) = users_model(users().skip_validation(true));
    model.insert(row! { "name" => "J" }, false).await.unwrap();
    assert_eq!(driver.rows("users").len(), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    // no rules
    let (mut model, _driver, runs) = users_model(ModelConfig::new("users").allowed_fields(["name"]));
    model.insert(row! { "name" => "J" }, false).await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    // empty row
    let (mut model, _driver, runs) = users_model(users());
    assert!(model.validate(&Row::new()).await.unwrap());
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    // every rule cleaned away
    assert!(model.validate(&row! { "nickname" => "jj" }).await.unwrap());
    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_custom_messages() {
    let config = users().message("email", "required", "Tell us where to write.");
    let (mut model, _driver, _runs) = users_model(config);

    model.insert(row! { "name" => "Jane" }, false).await.unwrap();
    assert_eq!(
        model.errors(false).get("email").map(String::as_str),
        Some("Tell us where to write.")
    );
}

#[tokio::test]
async fn test_rule_group_with_model_message_override() {
    let config = ModelConfig::new("users")
        .allowed_fields(["name", "email"])
        .rule_group("signup")
        .message("name", "required", "Names please.");
    let driver = Arc::new(MemoryDriver::new());
    let mut model = BaseModel::new(config, driver.clone())
        .unwrap()
        .with_validator(Validator::new().with_config(signup_rules()));

    let outcome = model.insert(row! { "nickname" => "jj", "email" => "" }, false).await;
    // nothing left after the allow-list, but validation runs first
    assert_eq!(outcome.unwrap(), WriteOutcome::Rejected);

    let errors = model.errors(false);
    assert_eq!(errors.get("name").map(String::as_str), Some("Names please."));
    assert_eq!(errors.get("email").map(String::as_str), Some("Email is mandatory."));

    let outcome = model
        .insert(row! { "name" => "Jane", "email" => "jane@example.com" }, false)
        .await
        .unwrap();
    assert_eq!(outcome, WriteOutcome::Done);
}

#[tokio::test]
async fn test_unknown_rule_group_is_a_config_error() {
    let config = ModelConfig::new("users").allowed_fields(["name"]).rule_group("missing");
    let (mut model, _driver, _runs) = users_model(config);

    let err = model.insert(row! { "name" => "Jane" }, false).await.unwrap_err();
    assert!(matches!(
        err,
        ModelError::Config(ConfigError::Validation(RuleError::UnknownGroup(ref g))) if g == "missing"
    ));
}

#[tokio::test]
async fn test_rule_accessors() {
    let (mut model, _driver, _runs) = users_model(users());

    let only = model.get_validation_rules(RuleFilter::Only(vec!["email".into()])).unwrap();
    assert_eq!(only.keys().collect::<Vec<_>>(), vec!["email"]);

    let except = model.get_validation_rules(RuleFilter::Except(vec!["email".into()])).unwrap();
    assert_eq!(except.keys().collect::<Vec<_>>(), vec!["name"]);

    model.set_validation_rule("email", "permit_empty|valid_email").unwrap();
    model.insert(row! { "name" => "Jane" }, false).await.unwrap();
    assert!(model.errors(false).is_empty());
}

#[tokio::test]
async fn test_set_validation_rule_expands_group() {
    let config = ModelConfig::new("users").allowed_fields(["name", "email"]).rule_group("signup");
    let driver = Arc::new(MemoryDriver::new());
    let mut model = BaseModel::new(config, driver)
        .unwrap()
        .with_validator(Validator::new().with_config(signup_rules()));

    model.set_validation_rule("age", "permit_empty|integer").unwrap();

    let rules = model.get_validation_rules(RuleFilter::All).unwrap();
    assert_eq!(rules.keys().collect::<Vec<_>>(), vec!["age", "email", "name"]);
}

#[tokio::test]
async fn test_errors_fall_back_to_driver() {
    let config = ModelConfig::new("users")
        .allowed_fields(["id", "name"])
        .rule("name", "required");
    let (mut model, driver, _runs) = users_model(config);
    driver.seed("users", "id", vec![row! { "id" => 1, "name" => "Jane" }]);

    let outcome = model.insert(row! { "id" => 1, "name" => "Again" }, false).await.unwrap();
    assert_eq!(outcome, WriteOutcome::Failed);
    assert!(model.errors(false).contains_key("23505"));

    model.insert(row! { "id" => 2 }, false).await.unwrap();
    assert!(model.errors(false).contains_key("name"));
    // forcing the driver's errors hides the validation ones
    assert!(model.errors(true).contains_key("23505"));
}

#[tokio::test]
async fn test_replace_validates_with_clean_rules() {
    let (mut model, driver, runs) = users_model(users());
    driver.seed("users", "id", vec![row! { "id" => 1, "name" => "Jane", "email" => "jane@example.com" }]);

    let outcome = model.replace(row! { "id" => 1, "name" => "Janet" }, false).await.unwrap();
    assert_eq!(outcome, WriteOutcome::Affected(1));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let outcome = model.replace(row! { "id" => 2, "name" => "J" }, false).await.unwrap();
    assert_eq!(outcome, WriteOutcome::Rejected);

    let sql = model.replace(row! { "id" => 3, "name" => "Jim" }, true).await.unwrap();
    assert!(matches!(sql, WriteOutcome::Sql(ref s) if s.starts_with("INSERT INTO users")));
}

#[tokio::test]
async fn test_skip_validation_toggle() {
    let (mut model, driver, _runs) = users_model(users());

    model.skip_validation(true);
    assert!(model.insert(json_row(json!({"name": "J"})), false).await.unwrap().is_success());

    model.skip_validation(false);
    assert_eq!(
        model.insert(json_row(json!({"name": "J"})), false).await.unwrap(),
        WriteOutcome::Rejected
    );
    assert_eq!(driver.rows("users").len(), 1);
}

fn json_row(value: serde_json::Value) -> Row {
    Row::from_json(value).unwrap()
}
