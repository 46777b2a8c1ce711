// src/pipeline.rs
//! Aggregation pipelines as data.
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s. Stages that carry
//! parameters are built through checked constructors so that a malformed
//! pipeline is rejected before it is sent to the server. Computed projection
//! fields are [`Expr`] trees; they are rendered to BSON and evaluated by
//! MongoDB, never locally.

use crate::error::{Result, StoreError};
use bson::{doc, Bson, Document};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn as_bson(self) -> Bson {
        match self {
            SortOrder::Ascending => Bson::Int32(1),
            SortOrder::Descending => Bson::Int32(-1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Bson),
    /// A field path on the current document, without the leading `$`.
    Field(String),
    /// A variable bound by `$map`, without the leading `$$`.
    Variable(String),
    Avg(Box<Expr>),
    Multiply(Vec<Expr>),
    Divide(Box<Expr>, Box<Expr>),
    Round(Box<Expr>),
    Size(Box<Expr>),
    Map {
        input: Box<Expr>,
        bind: String,
        each: Box<Expr>,
    },
}

impl Expr {
    pub fn literal(value: impl Into<Bson>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn field(path: impl Into<String>) -> Self {
        Expr::Field(path.into())
    }

    pub fn var(path: impl Into<String>) -> Self {
        Expr::Variable(path.into())
    }

    pub fn avg(input: Expr) -> Self {
        Expr::Avg(Box::new(input))
    }

    pub fn multiply(operands: Vec<Expr>) -> Self {
        Expr::Multiply(operands)
    }

    pub fn divide(dividend: Expr, divisor: Expr) -> Self {
        Expr::Divide(Box::new(dividend), Box::new(divisor))
    }

    pub fn round(input: Expr) -> Self {
        Expr::Round(Box::new(input))
    }

    pub fn size(input: Expr) -> Self {
        Expr::Size(Box::new(input))
    }

    pub fn map(input: Expr, bind: impl Into<String>, each: Expr) -> Self {
        Expr::Map {
            input: Box::new(input),
            bind: bind.into(),
            each: Box::new(each),
        }
    }

    /// `round(input * 2) / 2`: the nearest half star.
    pub fn nearest_half(input: Expr) -> Self {
        Expr::divide(
            Expr::round(Expr::multiply(vec![input, Expr::literal(2)])),
            Expr::literal(2),
        )
    }

    pub fn to_bson(&self) -> Bson {
        match self {
            Expr::Literal(value) => literal_bson(value),
            Expr::Field(path) => Bson::String(format!("${path}")),
            Expr::Variable(path) => Bson::String(format!("$${path}")),
            Expr::Avg(input) => Bson::Document(doc! { "$avg": input.to_bson() }),
            Expr::Multiply(operands) => {
                let operands: Vec<Bson> = operands.iter().map(Expr::to_bson).collect();
                Bson::Document(doc! { "$multiply": operands })
            }
            Expr::Divide(dividend, divisor) => Bson::Document(doc! {
                "$divide": [dividend.to_bson(), divisor.to_bson()]
            }),
            Expr::Round(input) => Bson::Document(doc! { "$round": input.to_bson() }),
            Expr::Size(input) => Bson::Document(doc! { "$size": input.to_bson() }),
            Expr::Map { input, bind, each } => Bson::Document(doc! {
                "$map": {
                    "input": input.to_bson(),
                    "as": bind.as_str(),
                    "in": each.to_bson(),
                }
            }),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Expr::Literal(_) => Ok(()),
            Expr::Field(path) => check_path(path),
            Expr::Variable(path) => check_path(path),
            Expr::Avg(input) | Expr::Round(input) | Expr::Size(input) => input.validate(),
            Expr::Multiply(operands) => {
                if operands.len() < 2 {
                    return Err(invalid("$multiply needs at least two operands"));
                }
                operands.iter().try_for_each(Expr::validate)
            }
            Expr::Divide(dividend, divisor) => {
                if matches!(divisor.as_ref(), Expr::Literal(v) if is_zero(v)) {
                    return Err(invalid("division by a literal zero"));
                }
                dividend.validate()?;
                divisor.validate()
            }
            Expr::Map { input, bind, each } => {
                if bind.is_empty() || bind.contains('.') || bind.starts_with('$') {
                    return Err(invalid(format!("bad $map variable name {bind:?}")));
                }
                input.validate()?;
                each.validate()
            }
        }
    }
}

fn literal_bson(value: &Bson) -> Bson {
    match value {
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => value.clone(),
        other => Bson::Document(doc! { "$literal": other.clone() }),
    }
}

fn is_zero(value: &Bson) -> bool {
    match value {
        Bson::Int32(n) => *n == 0,
        Bson::Int64(n) => *n == 0,
        Bson::Double(n) => *n == 0.0,
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectField {
    Include,
    Exclude,
    Computed(Expr),
}

/// One aggregation stage.
///
/// Only `$match` can be written out directly. The other payloads have
/// private fields, so those stages come from [`Stage::lookup`],
/// [`Stage::sort`] and [`Stage::project`] and are always well formed:
///
/// ```compile_fail
/// use cocktails::pipeline::{SortSpec, Stage};
///
/// let unchecked = Stage::Sort(SortSpec { keys: Vec::new() });
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Document),
    Lookup(Lookup),
    Sort(SortSpec),
    Project(ProjectSpec),
}

/// `$lookup` with an equality match between `local_field` and `foreign_field`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    from: String,
    local_field: String,
    foreign_field: String,
    as_field: String,
}

impl Lookup {
    /// The joined collection.
    pub fn collection(&self) -> &str {
        &self.from
    }

    pub fn local_field(&self) -> &str {
        &self.local_field
    }

    pub fn foreign_field(&self) -> &str {
        &self.foreign_field
    }

    pub fn as_field(&self) -> &str {
        &self.as_field
    }
}

/// Non-empty, duplicate-free sort keys, most significant first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<(String, SortOrder)>,
}

impl SortSpec {
    pub fn keys(&self) -> &[(String, SortOrder)] {
        &self.keys
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSpec {
    fields: Vec<(String, ProjectField)>,
}

impl ProjectSpec {
    pub fn fields(&self) -> &[(String, ProjectField)] {
        &self.fields
    }
}

impl Stage {
    pub fn match_filter(filter: Document) -> Self {
        Stage::Match(filter)
    }

    pub fn lookup(
        from: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
        as_field: impl Into<String>,
    ) -> Result<Self> {
        let from = from.into();
        if from.is_empty() || from.contains('$') {
            return Err(invalid(format!("bad $lookup collection {from:?}")));
        }
        let local_field = local_field.into();
        let foreign_field = foreign_field.into();
        let as_field = as_field.into();
        check_path(&local_field)?;
        check_path(&foreign_field)?;
        check_path(&as_field)?;

        Ok(Stage::Lookup(Lookup {
            from,
            local_field,
            foreign_field,
            as_field,
        }))
    }

    pub fn sort<K: Into<String>>(keys: impl IntoIterator<Item = (K, SortOrder)>) -> Result<Self> {
        let keys: Vec<(String, SortOrder)> =
            keys.into_iter().map(|(k, o)| (k.into(), o)).collect();
        if keys.is_empty() {
            return Err(invalid("$sort needs at least one key"));
        }
        for (key, _) in &keys {
            check_path(key)?;
        }
        check_unique(keys.iter().map(|(k, _)| k.as_str()), "$sort")?;
        Ok(Stage::Sort(SortSpec { keys }))
    }

    pub fn project<K: Into<String>>(
        fields: impl IntoIterator<Item = (K, ProjectField)>,
    ) -> Result<Self> {
        let fields: Vec<(String, ProjectField)> =
            fields.into_iter().map(|(k, f)| (k.into(), f)).collect();
        if fields.is_empty() {
            return Err(invalid("$project needs at least one field"));
        }
        for (name, _) in &fields {
            check_path(name)?;
        }
        check_unique(fields.iter().map(|(k, _)| k.as_str()), "$project")?;

        let mut excludes = false;
        let mut includes = false;
        for (name, field) in &fields {
            match field {
                ProjectField::Exclude if name != "_id" => excludes = true,
                ProjectField::Exclude => {}
                ProjectField::Include => includes = true,
                ProjectField::Computed(expr) => {
                    expr.validate()?;
                    includes = true;
                }
            }
        }
        if excludes && includes {
            return Err(invalid(
                "$project cannot mix exclusions with inclusions or computed fields",
            ));
        }

        Ok(Stage::Project(ProjectSpec { fields }))
    }

    pub fn to_document(&self) -> Document {
        match self {
            Stage::Match(filter) => doc! { "$match": filter.clone() },
            Stage::Lookup(lookup) => doc! {
                "$lookup": {
                    "from": lookup.from.as_str(),
                    "localField": lookup.local_field.as_str(),
                    "foreignField": lookup.foreign_field.as_str(),
                    "as": lookup.as_field.as_str(),
                }
            },
            Stage::Sort(sort) => {
                let spec: Document = sort
                    .keys
                    .iter()
                    .map(|(key, order)| (key.clone(), order.as_bson()))
                    .collect();
                doc! { "$sort": spec }
            }
            Stage::Project(project) => {
                let spec: Document = project
                    .fields
                    .iter()
                    .map(|(name, field)| {
                        let value = match field {
                            ProjectField::Include => Bson::Int32(1),
                            ProjectField::Exclude => Bson::Int32(0),
                            // A bare number here would read as an inclusion flag.
                            ProjectField::Computed(Expr::Literal(v)) => {
                                Bson::Document(doc! { "$literal": v.clone() })
                            }
                            ProjectField::Computed(expr) => expr.to_bson(),
                        };
                        (name.clone(), value)
                    })
                    .collect();
                doc! { "$project": spec }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Pipeline { stages }
    }

    /// Matches every document unchanged.
    pub fn empty() -> Self {
        Pipeline::default()
    }

    pub fn then(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn to_documents(&self) -> Vec<Document> {
        self.stages.iter().map(Stage::to_document).collect()
    }
}

/// Fields to leave out of `find` results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    excluded: Vec<String>,
}

impl Projection {
    /// Returns every field.
    pub fn all() -> Self {
        Projection::default()
    }

    /// Leaves out `fields`. Every result still has to decode as a
    /// [`crate::Recipe`], so the recipe name, ingredient names, review ratings
    /// and the inner fields of a quantity cannot be excluded.
    pub fn excluding<K: Into<String>>(fields: impl IntoIterator<Item = K>) -> Result<Self> {
        let excluded: Vec<String> = fields.into_iter().map(Into::into).collect();
        for field in &excluded {
            check_path(field).map_err(|_| {
                StoreError::InvalidProjection(format!("bad field name {field:?}"))
            })?;
            if let Some(required) = required_by_recipe(field) {
                let required = required.trim_end_matches('.');
                return Err(StoreError::InvalidProjection(format!(
                    "excluding {field:?} drops {required:?}, which every recipe needs"
                )));
            }
        }
        check_unique(excluded.iter().map(String::as_str), "projection")
            .map_err(|err| StoreError::InvalidProjection(err.to_string()))?;
        Ok(Projection { excluded })
    }

    pub fn to_document(&self) -> Option<Document> {
        if self.excluded.is_empty() {
            return None;
        }
        Some(
            self.excluded
                .iter()
                .map(|field| (field.clone(), Bson::Int32(0)))
                .collect(),
        )
    }
}

/// Fields `Recipe` cannot decode without. A quantity may be dropped whole
/// but not in part.
const REQUIRED_FIELDS: [&str; 4] = [
    "name",
    "ingredients.name",
    "ingredients.quantity.",
    "reviews.rating",
];

fn required_by_recipe(field: &str) -> Option<&'static str> {
    REQUIRED_FIELDS.into_iter().find(|&required| {
        if required.ends_with('.') {
            field.starts_with(required)
        } else {
            field == required || field.starts_with(&format!("{required}."))
        }
    })
}

/// `{ ingredients: { $elemMatch: { name } } }`
pub fn ingredient_filter(ingredient: &str) -> Document {
    doc! { "ingredients": { "$elemMatch": { "name": ingredient } } }
}

fn join_reviews(reviews_collection: &str) -> Result<Stage> {
    Stage::lookup(reviews_collection, "_id", "recipe_id", "reviews")
}

/// Recipes that use `ingredient`, each with its documents from the reviews
/// collection joined in as `reviews`.
pub fn with_reviews(ingredient: &str, reviews_collection: &str) -> Result<Pipeline> {
    Ok(Pipeline::empty()
        .then(Stage::match_filter(ingredient_filter(ingredient)))
        .then(join_reviews(reviews_collection)?))
}

/// Per-recipe rating summary computed from the reviews collection, best
/// rated first. Rows decode into [`crate::model::RatingSummary`].
pub fn cocktail_ratings(reviews_collection: &str) -> Result<Pipeline> {
    let project = Stage::project([
        ("name", ProjectField::Include),
        (
            "ratings",
            ProjectField::Computed(Expr::map(
                Expr::field("reviews"),
                "review",
                Expr::var("review.rating"),
            )),
        ),
        (
            "exact_rating",
            ProjectField::Computed(Expr::avg(Expr::field("reviews.rating"))),
        ),
        (
            "rating",
            ProjectField::Computed(Expr::nearest_half(Expr::avg(Expr::field(
                "reviews.rating",
            )))),
        ),
        (
            "rating_count",
            ProjectField::Computed(Expr::size(Expr::field("reviews.rating"))),
        ),
    ])?;
    let sort = Stage::sort([
        ("rating", SortOrder::Descending),
        ("name", SortOrder::Ascending),
    ])?;

    Ok(Pipeline::new(vec![join_reviews(reviews_collection)?, project, sort]))
}

fn invalid(message: impl Into<String>) -> StoreError {
    StoreError::InvalidPipeline(message.into())
}

fn check_path(path: &str) -> Result<()> {
    if path.is_empty() || path.starts_with('$') || path.split('.').any(str::is_empty) {
        return Err(invalid(format!("bad field path {path:?}")));
    }
    Ok(())
}

fn check_unique<'a>(names: impl Iterator<Item = &'a str>, stage: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(invalid(format!("{stage} lists {name:?} twice")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pipeline_renders_no_stages() {
        assert!(Pipeline::empty().to_documents().is_empty());
    }

    #[test]
    fn reviews_pipeline_matches_then_joins() {
        let pipeline = with_reviews("Vodka", "reviews").unwrap();
        assert_eq!(
            pipeline.to_documents(),
            vec![
                doc! { "$match": { "ingredients": { "$elemMatch": { "name": "Vodka" } } } },
                doc! {
                    "$lookup": {
                        "from": "reviews",
                        "localField": "_id",
                        "foreignField": "recipe_id",
                        "as": "reviews",
                    }
                },
            ]
        );
    }

    #[test]
    fn ratings_projection_computes_half_star_rating() {
        let pipeline = cocktail_ratings("reviews").unwrap();
        let stages = pipeline.to_documents();
        assert_eq!(stages.len(), 3);

        let project = stages[1].get_document("$project").unwrap();
        assert_eq!(project.get("name"), Some(&Bson::Int32(1)));
        assert_eq!(
            project.get_document("ratings").unwrap(),
            &doc! { "$map": { "input": "$reviews", "as": "review", "in": "$$review.rating" } }
        );
        assert_eq!(
            project.get_document("exact_rating").unwrap(),
            &doc! { "$avg": "$reviews.rating" }
        );
        assert_eq!(
            project.get_document("rating").unwrap(),
            &doc! {
                "$divide": [
                    { "$round": { "$multiply": [ { "$avg": "$reviews.rating" }, 2 ] } },
                    2,
                ]
            }
        );
        assert_eq!(
            project.get_document("rating_count").unwrap(),
            &doc! { "$size": "$reviews.rating" }
        );
        assert_eq!(stages[2], doc! { "$sort": { "rating": -1, "name": 1 } });
    }

    #[test]
    fn project_keeps_field_order() {
        let stage = cocktail_ratings("reviews").unwrap().stages()[1].clone();
        let keys: Vec<String> = stage
            .to_document()
            .get_document("$project")
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(
            keys,
            ["name", "ratings", "exact_rating", "rating", "rating_count"]
        );
    }

    #[test]
    fn lookup_rejects_blank_fields() {
        assert!(matches!(
            Stage::lookup("reviews", "", "recipe_id", "reviews"),
            Err(StoreError::InvalidPipeline(_))
        ));
        assert!(Stage::lookup("", "_id", "recipe_id", "reviews").is_err());
        assert!(Stage::lookup("reviews", "_id", "$recipe_id", "reviews").is_err());
        assert!(Stage::lookup("reviews", "_id", "recipe..id", "reviews").is_err());
    }

    #[test]
    fn sort_and_project_need_fields() {
        assert!(Stage::sort(Vec::<(String, SortOrder)>::new()).is_err());
        assert!(Stage::project(Vec::<(String, ProjectField)>::new()).is_err());
        let twice = Stage::sort([
            ("name", SortOrder::Ascending),
            ("name", SortOrder::Descending),
        ]);
        assert!(twice.is_err());
        assert!(Stage::sort([("$name", SortOrder::Ascending)]).is_err());
        assert!(Stage::project([("", ProjectField::Include)]).is_err());
    }

    #[test]
    fn stages_expose_what_their_constructors_checked() {
        let Stage::Lookup(lookup) = Stage::lookup("reviews", "_id", "recipe_id", "reviews").unwrap()
        else {
            panic!("expected a $lookup stage");
        };
        assert_eq!(
            [lookup.collection(), lookup.local_field(), lookup.foreign_field(), lookup.as_field()],
            ["reviews", "_id", "recipe_id", "reviews"]
        );

        let Stage::Sort(sort) = Stage::sort([("rating", SortOrder::Descending)]).unwrap() else {
            panic!("expected a $sort stage");
        };
        assert_eq!(sort.keys(), [("rating".to_string(), SortOrder::Descending)]);

        let Stage::Project(project) = Stage::project([("name", ProjectField::Include)]).unwrap()
        else {
            panic!("expected a $project stage");
        };
        assert_eq!(project.fields().len(), 1);
    }

    #[test]
    fn project_rejects_mixed_exclusion() {
        let mixed = Stage::project([
            ("name", ProjectField::Include),
            ("reviews", ProjectField::Exclude),
        ]);
        assert!(mixed.is_err());

        let without_id = Stage::project([
            ("_id", ProjectField::Exclude),
            ("name", ProjectField::Include),
        ]);
        assert!(without_id.is_ok());
    }

    #[test]
    fn computed_fields_are_validated() {
        let lonely = Stage::project([(
            "double",
            ProjectField::Computed(Expr::multiply(vec![Expr::field("x")])),
        )]);
        assert!(lonely.is_err());

        let by_zero = Stage::project([(
            "bad",
            ProjectField::Computed(Expr::divide(Expr::field("x"), Expr::literal(0))),
        )]);
        assert!(by_zero.is_err());

        let bad_bind = Stage::project([(
            "ratings",
            ProjectField::Computed(Expr::map(Expr::field("reviews"), "$r", Expr::var("r"))),
        )]);
        assert!(bad_bind.is_err());
    }

    #[test]
    fn literals_are_never_read_as_paths_or_flags() {
        assert_eq!(
            Expr::literal("$price").to_bson(),
            Bson::Document(doc! { "$literal": "$price" })
        );
        let stage = Stage::project([("one", ProjectField::Computed(Expr::literal(1)))]).unwrap();
        assert_eq!(
            stage.to_document(),
            doc! { "$project": { "one": { "$literal": 1 } } }
        );
    }

    #[test]
    fn projection_excludes_fields() {
        assert_eq!(Projection::all().to_document(), None);
        let projection = Projection::excluding(["reviews", "instructions"]).unwrap();
        assert_eq!(
            projection.to_document(),
            Some(doc! { "reviews": 0, "instructions": 0 })
        );
    }

    #[test]
    fn projection_cannot_drop_the_name() {
        assert!(matches!(
            Projection::excluding(["name"]),
            Err(StoreError::InvalidProjection(_))
        ));
        assert!(Projection::excluding([""]).is_err());
        assert!(Projection::excluding(["reviews", "reviews"]).is_err());
    }

    #[test]
    fn projection_keeps_what_recipes_need() {
        for field in [
            "name.first",
            "ingredients.name",
            "ingredients.quantity.amount",
            "ingredients.quantity.unit",
            "reviews.rating",
        ] {
            assert!(
                matches!(
                    Projection::excluding([field]),
                    Err(StoreError::InvalidProjection(_))
                ),
                "{field}"
            );
        }
        for field in [
            "ingredients",
            "ingredients.quantity",
            "reviews",
            "reviews.when",
            "garnish",
            "names",
        ] {
            assert!(Projection::excluding([field]).is_ok(), "{field}");
        }
    }

    #[test]
    fn recipes_decode_under_every_accepted_projection() {
        let projection = Projection::excluding(["ingredients.quantity", "reviews.when"]).unwrap();
        assert_eq!(
            projection.to_document(),
            Some(doc! { "ingredients.quantity": 0, "reviews.when": 0 })
        );
        let trimmed = doc! {
            "name": "Moscow Mule",
            "ingredients": [{ "name": "Vodka" }],
            "reviews": [{ "rating": 5 }],
        };
        let recipe: crate::Recipe = bson::from_document(trimmed).unwrap();
        assert_eq!(recipe.ingredients[0].quantity, None);

        // What `reviews.rating` would leave behind.
        let unrated = doc! { "name": "Moscow Mule", "reviews": [{}] };
        assert!(bson::from_document::<crate::Recipe>(unrated).is_err());
    }
}
