use anyhow::{Context, Result};
use colored::*;
use serde_json::{json, Value};
use std::io::{self, Write};
use std::time::Duration;

/// Simulador interactivo de un lector RFID/GPS montado en un bus
#[tokio::main]
async fn main() -> Result<()> {
    println!("{}", "🚌 Fleet Reader Simulator".bright_blue().bold());
    println!("{}", "=====================================".bright_blue());
    println!();

    let server = prompt_or("Servidor", "http://localhost:3000")?;
    let reader = prompt_or("Reader username", "R1")?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let mut position = (30.0444_f64, 31.2357_f64);

    loop {
        println!();
        println!("{}", "📋 MENÚ PRINCIPAL".bright_green().bold());
        println!("{}", "==================".bright_green());
        println!("1. 🏷️  Escanear tag");
        println!("2. 🛰️  Enviar posición GPS");
        println!("3. 🚗 Simular recorrido");
        println!("4. 🚨 Enviar emergencia");
        println!("5. ❤️  Ver estado del servidor");
        println!("6. 🚪 Salir");
        let choice = prompt("Selecciona una opción (1-6): ")?;

        let result = match choice.as_str() {
            "1" => {
                let tag = prompt("Tag ID: ")?;
                send_scan(&client, &server, json!({ "readerUsername": reader, "tagId": tag })).await
            }
            "2" => {
                let lat = prompt_or("Latitud", &position.0.to_string())?;
                let lng = prompt_or("Longitud", &position.1.to_string())?;
                match (lat.parse::<f64>(), lng.parse::<f64>()) {
                    (Ok(lat), Ok(lng)) => {
                        position = (lat, lng);
                        send_scan(&client, &server, fix_payload(&reader, position, 30.0)).await
                    }
                    _ => {
                        println!("{}", "❌ Coordenadas inválidas".bright_red());
                        Ok(())
                    }
                }
            }
            "3" => simulate_route(&client, &server, &reader, &mut position).await,
            "4" => {
                let mut payload = fix_payload(&reader, position, 0.0);
                payload["emergency"] = json!(true);
                send_scan(&client, &server, payload).await
            }
            "5" => show_health(&client, &server).await,
            "6" => {
                println!("{}", "👋 ¡Hasta luego!".bright_green());
                break;
            }
            _ => {
                println!("{}", "❌ Opción inválida. Intenta de nuevo.".bright_red());
                Ok(())
            }
        };

        if let Err(e) = result {
            println!("{} {:#}", "❌ Error:".bright_red(), e);
        }
    }

    Ok(())
}

fn fix_payload(reader: &str, (lat, lng): (f64, f64), speed_kmh: f64) -> Value {
    json!({
        "readerUsername": reader,
        "location": { "lat": lat, "lng": lng },
        "speed": speed_kmh,
        "heading": 90.0,
        "satellites": 9,
        "accuracy": 4.5,
        "fixQuality": 1
    })
}

async fn simulate_route(
    client: &reqwest::Client,
    server: &str,
    reader: &str,
    position: &mut (f64, f64),
) -> Result<()> {
    let steps: u32 = prompt_or("Número de puntos", "10")?
        .parse()
        .context("El número de puntos debe ser un entero")?;

    println!("{}", "🚗 Simulando recorrido...".bright_cyan());
    for step in 0..steps {
        // ~55 m por punto, con un punto repetido cada cuatro para probar el umbral
        if step % 4 != 3 {
            position.0 += 0.0005;
        }
        print!("   Punto {}/{} ({:.5}, {:.5}) → ", step + 1, steps, position.0, position.1);
        io::stdout().flush()?;
        send_scan(client, server, fix_payload(reader, *position, 35.0)).await?;
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    Ok(())
}

async fn send_scan(client: &reqwest::Client, server: &str, payload: Value) -> Result<()> {
    let url = format!("{}/rfid-scan", server.trim_end_matches('/'));
    let response = client.post(&url).json(&payload).send().await?;

    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);

    if status.is_success() {
        let updated = if body["locationUpdated"] == json!(true) { "📍" } else { "·" };
        println!(
            "{} {} {} {}",
            "✅".bright_green(),
            status.as_u16(),
            body["status"].as_str().unwrap_or("-"),
            updated
        );
    } else {
        println!(
            "{} {} {}",
            "⚠️".bright_yellow(),
            status.as_u16().to_string().bright_red(),
            serde_json::to_string_pretty(&body)?
        );
    }
    Ok(())
}

async fn show_health(client: &reqwest::Client, server: &str) -> Result<()> {
    let url = format!("{}/health", server.trim_end_matches('/'));
    let body: Value = client.get(&url).send().await?.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label.bright_yellow());
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn prompt_or(label: &str, default: &str) -> Result<String> {
    let value = prompt(&format!("{} [{}]: ", label, default))?;
    Ok(if value.is_empty() { default.to_string() } else { value })
}
