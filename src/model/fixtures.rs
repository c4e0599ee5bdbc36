// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Built-in demo flowsheets (also shared by tests and benches).

use super::expr::Expr;
use super::flowsheet::{BuildError, Flowsheet, VariableSpec};

pub const DEMO_NAMES: &[&str] = &["valve", "heater"];

pub fn demo(name: &str) -> Option<Result<Flowsheet, BuildError>> {
    match name {
        "valve" => Some(valve()),
        "heater" => Some(heater()),
        _ => None,
    }
}

/// Steam throttling valve, square (0 DOF):
///
/// - `F_out = F_in`
/// - `P_out = P_in + dP`
/// - `T_out = T_in`
/// - `F^2 = Cv^2 * opening^2 * (-dP)`
pub fn valve() -> Result<Flowsheet, BuildError> {
    let mut model = Flowsheet::default();
    model.add_block("fs", Some("FlowsheetBlock"))?;
    model.add_block("fs.valve", Some("Valve"))?;

    let flow_in = model.add_variable(
        "fs.valve.inlet.flow_mol[0.0]",
        VariableSpec::fixed(10.0).bounded(Some(1e-8), None).with_units("mol/s"),
    )?;
    let pressure_in = model.add_variable(
        "fs.valve.inlet.pressure[0.0]",
        VariableSpec::fixed(201_325.0).bounded(Some(1e3), Some(3e7)).with_units("Pa"),
    )?;
    let temperature_in = model.add_variable(
        "fs.valve.inlet.temperature[0.0]",
        VariableSpec::fixed(423.15).bounded(Some(250.0), Some(650.0)).with_units("K"),
    )?;
    let opening = model.add_variable(
        "fs.valve.valve_opening[0.0]",
        VariableSpec::fixed(0.5).bounded(Some(0.0), Some(1.0)),
    )?;
    let cv = model.add_variable("fs.valve.Cv", VariableSpec::fixed(0.05).bounded(Some(0.0), None))?;

    let flow_out = model.add_variable(
        "fs.valve.outlet.flow_mol[0.0]",
        VariableSpec::free(10.0).bounded(Some(1e-8), None).with_units("mol/s"),
    )?;
    let pressure_out = model.add_variable(
        "fs.valve.outlet.pressure[0.0]",
        VariableSpec::free(150_000.0).bounded(Some(1e3), Some(3e7)).with_units("Pa"),
    )?;
    let temperature_out = model.add_variable(
        "fs.valve.outlet.temperature[0.0]",
        VariableSpec::free(420.0).bounded(Some(250.0), Some(650.0)).with_units("K"),
    )?;
    let delta_p = model.add_variable(
        "fs.valve.deltaP[0.0]",
        VariableSpec::free(-50_000.0).bounded(None, Some(0.0)).with_units("Pa"),
    )?;

    model.add_equality(
        "fs.valve.material_balance[0.0]",
        Expr::sub(Expr::var(flow_out), Expr::var(flow_in)),
    )?;
    model.add_equality(
        "fs.valve.pressure_balance[0.0]",
        Expr::sub(Expr::var(pressure_out), Expr::add(vec![Expr::var(pressure_in), Expr::var(delta_p)])),
    )?;
    model.add_equality(
        "fs.valve.isothermal[0.0]",
        Expr::sub(Expr::var(temperature_out), Expr::var(temperature_in)),
    )?;
    model.add_equality(
        "fs.valve.pressure_flow_equation[0.0]",
        Expr::sub(
            Expr::pow(Expr::var(flow_out), 2.0),
            Expr::mul(vec![
                Expr::pow(Expr::var(cv), 2.0),
                Expr::pow(Expr::var(opening), 2.0),
                Expr::neg(Expr::var(delta_p)),
            ]),
        ),
    )?;

    Ok(model)
}

/// Two feeds mixed and heated to a fixed outlet temperature, square (0 DOF), plus a duty limit
/// inequality.
pub fn heater() -> Result<Flowsheet, BuildError> {
    let mut model = Flowsheet::default();
    model.add_block("fs", Some("FlowsheetBlock"))?;
    model.add_block("fs.feed_1", Some("Feed"))?;
    model.add_block("fs.feed_2", Some("Feed"))?;
    model.add_block("fs.mixer", Some("Mixer"))?;
    model.add_block("fs.heater", Some("Heater"))?;

    let cp = model.add_variable(
        "fs.properties.cp_mol",
        VariableSpec::fixed(75.3).bounded(Some(0.0), None).with_units("J/mol/K"),
    )?;

    let flow_1 = model.add_variable(
        "fs.feed_1.flow_mol[0.0]",
        VariableSpec::fixed(5.0).bounded(Some(0.0), None).with_units("mol/s"),
    )?;
    let temperature_1 = model.add_variable(
        "fs.feed_1.temperature[0.0]",
        VariableSpec::fixed(300.0).bounded(Some(250.0), Some(650.0)).with_units("K"),
    )?;
    let flow_2 = model.add_variable(
        "fs.feed_2.flow_mol[0.0]",
        VariableSpec::fixed(3.0).bounded(Some(0.0), None).with_units("mol/s"),
    )?;
    let temperature_2 = model.add_variable(
        "fs.feed_2.temperature[0.0]",
        VariableSpec::fixed(350.0).bounded(Some(250.0), Some(650.0)).with_units("K"),
    )?;

    let mixed_flow = model.add_variable(
        "fs.mixer.outlet.flow_mol[0.0]",
        VariableSpec::free(1.0).bounded(Some(0.0), None).with_units("mol/s"),
    )?;
    let mixed_temperature = model.add_variable(
        "fs.mixer.outlet.temperature[0.0]",
        VariableSpec::free(300.0).bounded(Some(250.0), Some(650.0)).with_units("K"),
    )?;

    let heated_flow = model.add_variable(
        "fs.heater.outlet.flow_mol[0.0]",
        VariableSpec::free(1.0).bounded(Some(0.0), None).with_units("mol/s"),
    )?;
    let heated_temperature = model.add_variable(
        "fs.heater.outlet.temperature[0.0]",
        VariableSpec::fixed(400.0).bounded(Some(250.0), Some(650.0)).with_units("K"),
    )?;
    let duty = model.add_variable(
        "fs.heater.heat_duty[0.0]",
        VariableSpec::free(0.0).with_units("W"),
    )?;

    model.add_equality(
        "fs.mixer.material_mixing[0.0]",
        Expr::sub(Expr::var(mixed_flow), Expr::add(vec![Expr::var(flow_1), Expr::var(flow_2)])),
    )?;
    model.add_equality(
        "fs.mixer.enthalpy_mixing[0.0]",
        Expr::sub(
            Expr::mul(vec![Expr::var(mixed_flow), Expr::var(mixed_temperature)]),
            Expr::add(vec![
                Expr::mul(vec![Expr::var(flow_1), Expr::var(temperature_1)]),
                Expr::mul(vec![Expr::var(flow_2), Expr::var(temperature_2)]),
            ]),
        ),
    )?;
    model.add_equality(
        "fs.heater.material_balance[0.0]",
        Expr::sub(Expr::var(heated_flow), Expr::var(mixed_flow)),
    )?;
    model.add_equality(
        "fs.heater.enthalpy_balance[0.0]",
        Expr::sub(
            Expr::var(duty),
            Expr::mul(vec![
                Expr::var(heated_flow),
                Expr::var(cp),
                Expr::sub(Expr::var(heated_temperature), Expr::var(mixed_temperature)),
            ]),
        ),
    )?;
    model.add_constraint("fs.heater.duty_limit[0.0]", Expr::var(duty), None, Some(1e6))?;

    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demos_are_square() {
        for name in DEMO_NAMES {
            let model = demo(name).expect("known demo").expect("build demo");
            assert_eq!(model.degrees_of_freedom(), 0, "{name}");
        }
        assert!(demo("nope").is_none());
    }
}
