// src/model.rs
use crate::error::{Result, StoreError};
use bson::oid::ObjectId;
use bson::DateTime;
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub garnish: Option<String>,
    /// Reviews pushed onto the recipe itself by `append_review`. The
    /// `reviews` collection is a separate model and is never merged in here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviews: Option<Vec<EmbeddedReview>>,
}

impl Recipe {
    pub fn new(name: impl Into<String>) -> Self {
        Recipe {
            id: None,
            name: name.into(),
            ingredients: Vec::new(),
            instructions: Vec::new(),
            garnish: None,
            reviews: None,
        }
    }

    pub fn with_ingredient(mut self, name: impl Into<String>, quantity: Quantity) -> Self {
        self.ingredients.push(Ingredient {
            name: name.into(),
            quantity: Some(quantity),
        });
        self
    }

    pub fn with_instruction(mut self, step: impl Into<String>) -> Self {
        self.instructions.push(step.into());
        self
    }

    pub fn with_garnish(mut self, garnish: impl Into<String>) -> Self {
        self.garnish = Some(garnish.into());
        self
    }

    pub fn uses(&self, ingredient: &str) -> bool {
        self.ingredients.iter().any(|i| i.name == ingredient)
    }

    pub fn review_count(&self) -> usize {
        self.reviews.as_ref().map_or(0, Vec::len)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    /// Absent for ingredients such as "a dash of bitters" or "top with soda".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Quantity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    #[serde(default)]
    pub unit: String,
    // Older recipe documents use `value` or `quantity`.
    #[serde(alias = "value", alias = "quantity")]
    pub amount: Amount,
}

impl Quantity {
    pub fn new(amount: f64, unit: impl Into<String>) -> Self {
        Quantity {
            unit: unit.into(),
            amount: Amount::Number(amount),
        }
    }

    pub fn ml(amount: f64) -> Self {
        Self::new(amount, "ml")
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.unit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(f64),
    Text(String),
}

impl Amount {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Amount::Number(n) => Some(*n),
            Amount::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Amount::Number(n) => write!(f, "{n}"),
            Amount::Text(s) => f.write_str(s),
        }
    }
}

/// A star rating in `1..=5`.
///
/// Stored as an int32. Decoding also accepts int64 and integral doubles,
/// which shell-written documents often contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(into = "i32")]
pub struct Rating(u8);

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRating {
    Integer(i64),
    Double(f64),
}

impl Rating {
    pub const MIN: i64 = 1;
    pub const MAX: i64 = 5;

    pub fn new(value: i64) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Rating(value as u8))
        } else {
            Err(StoreError::InvalidRating(value as f64))
        }
    }

    pub fn random() -> Self {
        use rand::Rng;
        Rating(rand::thread_rng().gen_range(1..=5))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = StoreError;

    fn try_from(value: i64) -> Result<Self> {
        Rating::new(value)
    }
}

impl<'de> Deserialize<'de> for Rating {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let rating = match StoredRating::deserialize(deserializer)? {
            StoredRating::Integer(value) => Rating::new(value),
            StoredRating::Double(value) if value.fract() == 0.0 => Rating::new(value as i64),
            StoredRating::Double(value) => Err(StoreError::InvalidRating(value)),
        };
        rating.map_err(serde::de::Error::custom)
    }
}

impl From<Rating> for i32 {
    fn from(rating: Rating) -> Self {
        i32::from(rating.0)
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedReview {
    pub rating: Rating,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<DateTime>,
}

impl EmbeddedReview {
    pub fn new(rating: Rating, when: chrono::DateTime<Utc>) -> Self {
        EmbeddedReview {
            rating,
            when: Some(DateTime::from_chrono(when)),
        }
    }
}

/// A document in the `reviews` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Must be the identifier of an existing recipe. Nothing in the store enforces it.
    pub recipe_id: ObjectId,
    pub rating: Rating,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<DateTime>,
}

impl Review {
    pub fn new(recipe_id: ObjectId, rating: Rating) -> Self {
        Review {
            id: None,
            recipe_id,
            rating,
            when: None,
        }
    }

    pub fn at(mut self, when: chrono::DateTime<Utc>) -> Self {
        self.when = Some(DateTime::from_chrono(when));
        self
    }
}

/// One row of [`crate::pipeline::cocktail_ratings`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RatingSummary {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    #[serde(default)]
    pub ratings: Vec<Rating>,
    #[serde(default)]
    pub exact_rating: Option<f64>,
    #[serde(default)]
    pub rating: Option<f64>,
    pub rating_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, Bson};

    #[test]
    fn decodes_legacy_quantity_shapes() {
        let recipe: Recipe = bson::from_document(doc! {
            "_id": ObjectId::new(),
            "name": "Abilene",
            "ingredients": [
                { "name": "Dark rum", "quantity": { "quantity": "45", "unit": "ml" } },
                { "name": "Campari", "quantity": { "unit": "ml", "value": 30 } },
                { "name": "Peach nectar", "quantity": { "unit": "oz", "amount": 2.5 } },
            ],
            "instructions": ["Stir well."],
        })
        .unwrap();

        let amounts: Vec<Option<f64>> = recipe
            .ingredients
            .iter()
            .map(|i| i.quantity.as_ref().and_then(|q| q.amount.as_f64()))
            .collect();
        assert_eq!(amounts, vec![Some(45.0), Some(30.0), Some(2.5)]);
        assert_eq!(recipe.garnish, None);
        assert_eq!(recipe.review_count(), 0);
        assert!(recipe.uses("Campari"));
        assert!(!recipe.uses("Vodka"));
    }

    #[test]
    fn projected_recipe_without_ingredients_still_decodes() {
        let recipe: Recipe = bson::from_document(doc! { "name": "Moscow Mule" }).unwrap();
        assert_eq!(recipe, Recipe::new("Moscow Mule"));
    }

    #[test]
    fn ingredients_without_a_quantity_decode() {
        let recipe: Recipe = bson::from_document(doc! {
            "name": "Moscow Mule",
            "ingredients": [
                { "name": "Vodka", "quantity": { "unit": "ml", "amount": 45 } },
                { "name": "Ginger beer" },
            ],
        })
        .unwrap();

        assert_eq!(recipe.ingredients[1].name, "Ginger beer");
        assert_eq!(recipe.ingredients[1].quantity, None);
        let doc = bson::to_document(&recipe).unwrap();
        let ginger = doc.get_array("ingredients").unwrap()[1].as_document().unwrap();
        assert!(!ginger.contains_key("quantity"));
    }

    #[test]
    fn new_recipes_are_written_without_an_id() {
        let recipe = Recipe::new("The Ghost")
            .with_ingredient("Vodka", Quantity::ml(50.0))
            .with_garnish("Lime");
        let doc = bson::to_document(&recipe).unwrap();

        assert!(!doc.contains_key("_id"));
        assert!(!doc.contains_key("reviews"));
        let quantity = doc.get_array("ingredients").unwrap()[0]
            .as_document()
            .unwrap()
            .get_document("quantity")
            .unwrap();
        assert_eq!(quantity.get("amount"), Some(&Bson::Double(50.0)));
    }

    #[test]
    fn rating_bounds() {
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(6).is_err());
        assert_eq!(Rating::new(5).unwrap().value(), 5);
        for _ in 0..50 {
            let r = Rating::random().value();
            assert!((1..=5).contains(&r));
        }
    }

    #[test]
    fn out_of_range_stored_rating_fails_to_decode() {
        let err = bson::from_document::<EmbeddedReview>(doc! { "rating": 7 }).unwrap_err();
        assert!(err.to_string().contains("between 1 and 5"));
    }

    #[test]
    fn ratings_written_as_doubles_or_int64_decode() {
        let recipe: Recipe = bson::from_document(doc! {
            "name": "Negroni",
            "reviews": [
                { "rating": 4.0 },
                { "rating": 2_i64 },
                { "rating": 5 },
            ],
        })
        .unwrap();
        let ratings: Vec<u8> = recipe
            .reviews
            .unwrap()
            .iter()
            .map(|r| r.rating.value())
            .collect();
        assert_eq!(ratings, [4, 2, 5]);

        let half = bson::from_document::<EmbeddedReview>(doc! { "rating": 4.5 }).unwrap_err();
        assert!(half.to_string().contains("got 4.5"), "{half}");
        assert!(bson::from_document::<EmbeddedReview>(doc! { "rating": "4" }).is_err());
    }

    #[test]
    fn reviews_store_ratings_as_int32() {
        let review = Review::new(ObjectId::new(), Rating::new(4).unwrap());
        let doc = bson::to_document(&review).unwrap();
        assert_eq!(doc.get("rating"), Some(&Bson::Int32(4)));
        assert!(!doc.contains_key("when"));
    }

    #[test]
    fn rating_summary_tolerates_missing_averages() {
        let summary: RatingSummary = bson::from_document(doc! {
            "_id": ObjectId::new(),
            "name": "Negroni Sbagliato",
            "ratings": [],
            "exact_rating": Bson::Null,
            "rating": Bson::Null,
            "rating_count": 0,
        })
        .unwrap();
        assert_eq!(summary.rating, None);
        assert_eq!(summary.rating_count, 0);
    }

    #[test]
    fn rating_summary_reads_double_ratings() {
        let summary: RatingSummary = bson::from_document(doc! {
            "_id": ObjectId::new(),
            "name": "Abilene",
            "ratings": [5, 4.0],
            "exact_rating": 4.5,
            "rating": 4.5,
            "rating_count": 2,
        })
        .unwrap();
        let ratings: Vec<u8> = summary.ratings.iter().map(|r| r.value()).collect();
        assert_eq!(ratings, [5, 4]);
    }
}
