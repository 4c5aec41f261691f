//! A subcommand making sure various things are working. Useful for updating
//! Agora where you want to check as many things as possible as early as
//! possible.

use anyhow::Result;

use crate::{
    args::{self, Args},
    db,
    load_config_and_init_logger,
    prelude::*,
};


pub(crate) async fn run(shared: &args::Shared, args: &Args) -> Result<()> {
    let config = load_config_and_init_logger(shared, args, "check")
        .context("failed to load config: cannot proceed with `check` command")?;


    // Perform main checks
    info!("Starting to verify various things...");
    let db_pool = db::create_pool(&config.db).await;
    let migrations = match &db_pool {
        Ok(pool) => check_migrations(pool).await,
        Err(_) => Err(anyhow!("skipped: DB connection failed")),
    };
    info!("Done verifying various things");


    // Print summary after all log output
    let mut any_errors = false;
    println!();
    bunt::println!("{$bold+blue+intense}Summary{/$}");
    println!();
    print_outcome(&mut any_errors, "Load configuration", &Ok(()));
    print_outcome(&mut any_errors, "Connection to DB", &db_pool);
    print_outcome(&mut any_errors, "DB migrations", &migrations);

    println!();
    if any_errors {
        bunt::println!("{$red+intense}➡  Errors have occured!{/$}");
        std::process::exit(1);
    } else {
        bunt::println!("{$green+intense}⮕  Everything OK{/$} \
            {$dimmed}(Agora probably works in this environment){/$}");
        println!("   ");
        Ok(())
    }
}

fn print_outcome<T>(any_errors: &mut bool, label: &str, result: &Result<T>) {
    match result {
        Ok(_) => {
            bunt::println!(" ▸ {[bold+intense]}  {$green+bold}✔ ok{/$}", label);
        }
        Err(e) => {
            *any_errors = true;
            bunt::println!(" ▸ {[bold+intense]}  {$red+bold}✘ error{/$}", label);
            bunt::println!("      {$red}▶▶▶ {$bold}Error:{/$}{/$} {[yellow+intense]}", e);
            println!();
            bunt::println!("      {$red+italic}Caused by:{/$}");

            for (i, cause) in e.chain().skip(1).enumerate() {
                print!("       {: >1$}", "", i * 2);
                println!("‣ {cause}");
            }
            println!();
        }
    }
}

/// Checks that the DB schema matches this binary's migrations, without
/// modifying anything.
async fn check_migrations(pool: &deadpool_postgres::Pool) -> Result<()> {
    let mut db = pool.get().await?;
    let tx = db.transaction().await?;
    let plan = db::MigrationPlan::build(&tx).await?;
    tx.rollback().await?;

    match plan {
        db::MigrationPlan::UpToDate => Ok(()),
        db::MigrationPlan::EmptyDb => {
            info!("DB is empty; migrations will run on next `serve` or `db migrate`");
            Ok(())
        }
        db::MigrationPlan::Migrate { new_migrations } => {
            info!("{new_migrations} migrations pending; they will run on next start");
            Ok(())
        }
    }
}
