use stress_test::{stress_test_convergence, stress_test_scaling};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn std::error::Error>> {
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            ASYNC STRESS TESTS                               ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut all_converged = true;

    // Test 1: few clients, frequent pushes
    let stats = stress_test_convergence(4, 100, 5).await?;
    stats.print();
    all_converged &= stats.converged;

    // Test 2: few clients, large batches
    let stats = stress_test_convergence(4, 200, 50).await?;
    stats.print();
    all_converged &= stats.converged;

    // Test 3: many clients
    let stats = stress_test_convergence(16, 100, 10).await?;
    stats.print();
    all_converged &= stats.converged;

    // Test 4: Scaling analysis
    stress_test_scaling(12, 4).await?;

    if all_converged {
        println!("\n✓ All stress tests completed successfully!");
        Ok(())
    } else {
        Err("clients diverged from the server".into())
    }
}
