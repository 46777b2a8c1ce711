// src/bin/cocktails/sections.rs
use anyhow::{bail, Context, Result};
use chrono::Utc;
use cocktails::display::{describe_change, pretty, pretty_document, print_title};
use cocktails::pipeline::{self, Pipeline, Projection};
use cocktails::{
    Quantity, Rating, RatingSummary, Recipe, RecipeStore, Review, StoreError, TransactionSettings,
};
use futures::{FutureExt, StreamExt, TryStreamExt};

const NEGRONI_SBAGLIATO: &str = "Negroni Sbagliato";
const THE_GHOST: &str = "The Ghost";

pub async fn all_documents(store: &RecipeStore) -> Result<()> {
    print_title("All Documents");
    for recipe in store.list_all().await? {
        println!("Cocktail: {}", recipe.name);
    }
    Ok(())
}

pub async fn by_name(store: &RecipeStore, name: &str) -> Result<()> {
    print_title(name);
    let mut recipes = store.find_by_name(name).await?;
    while let Some(recipe) = recipes.try_next().await? {
        println!("{}", pretty(&recipe));
    }
    Ok(())
}

pub async fn by_ingredient(
    store: &RecipeStore,
    ingredient: &str,
    exclude: &[String],
) -> Result<()> {
    print_title(&format!("{ingredient} Cocktails"));
    let projection = Projection::excluding(exclude.iter().cloned())?;
    let mut recipes = store.find_by_ingredient(ingredient, &projection).await?;
    while let Some(recipe) = recipes.try_next().await? {
        println!(" * {}", recipe.name);
    }
    Ok(())
}

pub async fn empty_pipeline(store: &RecipeStore) -> Result<()> {
    print_title("Empty Aggregation Pipeline");
    let mut rows = store.aggregate(&Pipeline::empty()).await?;
    while let Some(row) = rows.try_next().await? {
        println!(" * {}", row.get_str("name").unwrap_or("<unnamed>"));
    }
    Ok(())
}

pub async fn reviews(store: &RecipeStore, ingredient: &str) -> Result<()> {
    print_title(&format!("{ingredient} Cocktail Reviews"));
    let pipeline = pipeline::with_reviews(ingredient, store.reviews_collection())?;
    let mut rows = store.aggregate(&pipeline).await?;
    while let Some(row) = rows.try_next().await? {
        println!("{}", pretty_document(&row));
    }
    Ok(())
}

pub async fn ratings(store: &RecipeStore) -> Result<()> {
    print_title("Cocktail Ratings");
    let pipeline = pipeline::cocktail_ratings(store.reviews_collection())?;
    let mut rows = store.aggregate_as::<RatingSummary>(&pipeline).await?;
    while let Some(row) = rows.try_next().await? {
        match (row.rating, row.exact_rating) {
            (Some(rating), Some(exact)) => println!(
                "{:<30} {:>3.1} ({:.2} from {} reviews)",
                row.name, rating, exact, row.rating_count
            ),
            _ => println!("{:<30} unrated", row.name),
        }
    }
    Ok(())
}

/// Prints changes until Ctrl-C. Listening for the signal replaces its default
/// handler for the rest of the process, so callers that keep running must
/// listen for it themselves.
pub async fn watch(store: &RecipeStore) -> Result<()> {
    print_title("Watch for Changes");
    println!("Waiting for updates ... Ctrl-C to move on.");

    let mut changes = store.watch_changes().await?;
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            _ = &mut interrupt => {
                println!();
                break;
            }
            next = changes.next() => match next {
                Some(event) => println!("{}", describe_change(&event?)),
                None => break,
            },
        }
    }
    Ok(())
}

pub async fn transaction_demo(store: &RecipeStore) -> Result<()> {
    print_title("Transaction test");

    let outcome = store
        .run_transaction(&TransactionSettings::default(), |session, scope| {
            let ratings: Vec<Rating> = (0..5).map(|_| Rating::random()).collect();
            async move {
                let recipe_id = scope.insert_recipe(session, &Recipe::new(THE_GHOST)).await?;
                for (i, rating) in ratings.into_iter().enumerate() {
                    scope
                        .insert_review(session, &Review::new(recipe_id, rating).at(Utc::now()))
                        .await?;
                    if i == 2 {
                        return Err(StoreError::Transaction(
                            "Oops, failed transaction after the third review insertion"
                                .to_string(),
                        ));
                    }
                }
                Ok(())
            }
            .boxed()
        })
        .await;

    match outcome {
        Err(err) if err.is_fatal() => return Err(err.into()),
        Err(err) => println!("{err}"),
        Ok(()) => {}
    }

    print!("Is there a recipe in the database? ");
    match store.find_one_by_name(THE_GHOST).await? {
        None => println!("Nope!"),
        Some(_) => println!("Oh dear, yes."),
    }
    Ok(())
}

pub async fn add_review(store: &RecipeStore, name: &str, rating: Rating) -> Result<()> {
    print_title("Updating Part of a Document");
    let outcome = store.append_review(name, rating, Utc::now()).await?;
    if !outcome.found() {
        println!("No recipe called {name:?}.");
        return Ok(());
    }
    let recipe = store
        .find_one_by_name(name)
        .await?
        .with_context(|| format!("{name} disappeared after the update"))?;
    println!("{}", pretty(&recipe));
    Ok(())
}

pub async fn seed(store: &RecipeStore) -> Result<()> {
    let recipe = Recipe::new(NEGRONI_SBAGLIATO)
        .with_ingredient("Campari", Quantity::ml(30.0))
        .with_ingredient("Sweet Vermouth", Quantity::ml(30.0))
        .with_ingredient("Prosecco", Quantity::ml(30.0))
        .with_instruction("Stir Campari & vermouth with ice")
        .with_instruction("Pour into a champagne flute")
        .with_instruction("Add wine & gently combine")
        .with_instruction("Serve with orange twist")
        .with_garnish("Orange Twist");
    let id = store.insert_recipe(&recipe).await?;
    println!("Inserted {NEGRONI_SBAGLIATO} as {id}");
    Ok(())
}

pub async fn tour(store: &RecipeStore) -> Result<()> {
    all_documents(store).await?;
    by_name(store, NEGRONI_SBAGLIATO).await?;
    by_ingredient(store, "Vodka", &["reviews".to_string()]).await?;
    empty_pipeline(store).await?;
    reviews(store, "Vodka").await?;
    ratings(store).await?;
    watch(store).await?;

    let rest = async {
        transaction_demo(store).await?;
        add_review(store, NEGRONI_SBAGLIATO, Rating::new(4)?).await
    };
    tokio::select! {
        result = rest => result,
        _ = tokio::signal::ctrl_c() => {
            println!();
            bail!("interrupted")
        }
    }
}
