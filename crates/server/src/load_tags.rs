use sqlx::postgres::PgPoolOptions;
use std::env;

fn slugify(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let db = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    println!("Connected to database!");

    // Read tags from file
    let tags_content =
        std::fs::read_to_string("tags.txt").expect("Failed to read tags.txt - make sure it exists!");

    let mut count = 0;
    let mut skipped = 0;

    for line in tags_content.lines() {
        let tag = line.trim().to_lowercase();
        if tag.is_empty() || tag.starts_with('#') {
            continue;
        }

        // Check if tag already exists
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tags WHERE name = $1)")
            .bind(&tag)
            .fetch_one(&db)
            .await?;

        if exists {
            println!("⊘ Skipped (duplicate): {}", tag);
            skipped += 1;
            continue;
        }

        sqlx::query("INSERT INTO tags (name, slug) VALUES ($1, $2)")
            .bind(&tag)
            .bind(slugify(&tag))
            .execute(&db)
            .await?;

        count += 1;
        println!("✓ Loaded: {}", tag);
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Successfully loaded {} new tags!", count);
    if skipped > 0 {
        println!("⊘ Skipped {} duplicate tags", skipped);
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    Ok(())
}
