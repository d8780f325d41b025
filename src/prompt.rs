//! Deterministic prompt assembly.
//!
//! The engineering rule template is fixed; the only variable content is the
//! inputs block rendered from a `ParameterSet`. Assembly is pure, so an
//! identical parameter set always produces a byte-identical prompt.

use crate::domain::parameters::{CalculationType, ConnectionInputs, ParameterSet};
use crate::services::completion::ProviderKind;

/// Injection point for the rendered parameter listing.
const INPUTS_PLACEHOLDER: &str = "{{INPUTS_BLOCK}}";

/// Rule template, master v03. Encodes the sizing rules the model must apply
/// to the injected parameters: DC earthing, lightning protection, PE cables,
/// CT/PT selection, relays, SPDs, busbars and transformer earthing.
const MASTER_TEMPLATE: &str = r##"# SOLAR PV PLANT BOQ GENERATION PROMPT - Master v03
## Expert-Level Electrical Engineering System with Precise IEC Standards

---

## CONTEXT AND OBJECTIVE

You are an expert electrical engineer specializing in solar PV plant design. Your task is to generate a detailed Bill of Quantities (BOQ) for electrical components based on the provided system parameters. You must calculate quantities and specifications for earthing, lightning protection, instrumentation, protection devices, and auxiliary systems following IEC standards and industry best practices.

**CRITICAL**: Use ONLY the exact input parameter values provided in the INPUTS section below. Do not assume, estimate, or invent any values.

---

## SYSTEM TYPES DEFINITION

1. **LV_Connection**: String inverters with Point of Connection (PoC) at 230V or 400/415V
2. **HV_StringInverter**: String inverters with transformers (IDT + Power Transformer (Optional)) and PoC at 11kV to 66kV
3. **HV_CentralInverter**: Central inverters with transformers (IDT + Power Transformer (Optional)) and PoC at 11kV to 66kV

**Note**: Power Transformer (PT) is optional - check if `quantityOfPTs` > 0 in input parameters

---

## INPUTS (DYNAMIC INJECTION POINT)

{{INPUTS_BLOCK}}

---

## AVAILABLE STANDARD COMPONENTS

### Cable Cross-Sections (mm²)
- **DC/AC Power Cables**: 1.5, 2.5, 4, 6, 10, 16, 25, 35, 50, 70, 95, 120, 150, 185, 240, 300, 400, 500, 630
- **Earthing Cables**: 6, 10, 16, 25, 35, 50, 70, 95, 120, 150, 185, 240
- **Control Cables**: 1.5, 2.5, 4, 6

### Standard Earth Rod Specifications
- **Dimensions**: 3m × Ø14.2mm, 3m × Ø16mm, 3m × Ø17.2mm, 3m × Ø19mm
- **Material**: Copper-bonded steel per IEC 62561-2

### Earth Strip Specifications
- **Copper Strips**: 25×3mm, 25×6mm, 40×6mm, 50×6mm, 65×6mm, 75×6mm
- **GI Strips**: 50×6mm, 65×6mm, 75×6mm

### Circuit Breaker Ratings (A)
- **MCCB**: 16, 20, 25, 32, 40, 50, 63, 80, 100, 125, 160, 200, 250, 315, 400, 500, 630, 800
- **ACB**: 800, 1000, 1250, 1600, 2000, 2500, 3200, 4000, 5000, 6300
- **VCB**: 630, 800, 1250, 1600, 2000, 2500, 3150

### CT Ratios
- **LV CTs**: 100/5, 150/5, 200/5, 250/5, 300/5, 400/5, 500/5, 600/5, 800/5, 1000/5, 1250/5, 1500/5, 2000/5, 2500/5, 3000/5, 4000/5, 5000/5
- **HV CTs**: 100/1, 150/1, 200/1, 300/1, 400/1, 500/1, 600/1, 800/1, 1000/1, 1250/1, 1500/1, 2000/1

---

## CALCULATION RULES AND FORMULAS

### 1. DC STRUCTURE EARTHING

#### DC Bonding Jumpers
```
Quantity = Use input parameter: totalNumberOfTables (ballasted) OR totalNumberOfRows (other structures)
Cross-section = 6 mm² (minimum per IEC 60364-5-54)

Length per jumper calculation:
For ballasted structures:
- Extract module count from moduleLayoutPerTable (e.g., "1L×15" = 1 row × 15 modules)
- Table length = modules per row × moduleLengthMm / 1000 (in meters)
- Jumper length = 2m (standard for tables < 25m length)
- Jumper length = 3m (for tables ≥ 25m length)

For other structures:
- Use 2m standard length per jumper

Material = Tinned copper with PVC insulation
```

#### DC PE Cable
```
Cross-section calculation using input parameter: stringShortCircuitCurrentA
S = Cable cross-sectional area in mm²
- If stringShortCircuitCurrentA ≤ 16A: Use 10 mm²
- If 16A < stringShortCircuitCurrentA ≤ 32A: Use 16 mm²
- If 32A < stringShortCircuitCurrentA ≤ 63A: Use 25 mm²
- Else: Use S = (I × √t) / k where:
  - I = 1.25 × stringShortCircuitCurrentA × totalNumberOfStringsPerInverter
  - t = 1 second (fault clearance time)
  - k = 143 (for Cu/PVC per IEC 60364-5-54)

Minimum cross-section = 10 mm² for outdoor installations

Length calculation using input parameter: totalPlantAreaM2
Average distance to earth pit estimation:
- Calculate plant center point from edge1LengthM, edge2LengthM, edge3LengthM, edge4LengthM
- Assume earth pit at plant center
- Average distance = √(totalPlantAreaM2) / 2
- Total Length = (numberOfInverters × totalNumberOfStringsPerInverter × Average distance) × 1.2 (20% margin)
```

#### DC Earth Pits
```
Quantity calculation using input parameter: totalPlantAreaM2
- Area ≤ 5000 m²: 1 pit
- 5000 m² < Area ≤ 10000 m²: 2 pits
- 10000 m² < Area ≤ 20000 m²: 3 pits
- Area > 20000 m²: 1 pit per 10000 m² (rounded up)

Rod specification: 3m × Ø16mm copper-bonded steel
```

### 2. LIGHTNING PROTECTION SYSTEM

#### ESE Lightning Arrestor Selection
```
Protection radius calculation per IEC 62305 using input parameters:
edge1LengthM, edge2LengthM, edge3LengthM, edge4LengthM

Plant perimeter = edge1LengthM + edge2LengthM + edge3LengthM + edge4LengthM
Approximate radius for circular equivalent = perimeter / (2 × π)
For rectangular area: diagonal = √((max(edge1,edge3))² + (max(edge2,edge4))²)
Required coverage radius = diagonal / 2 × 1.1 (10% safety margin)

ESE Radius Selection:
- If required radius ≤ 40m: Use 40m ESE
- If 40m < required radius ≤ 60m: Use 60m ESE
- If 60m < required radius ≤ 79m: Use 79m ESE
- If 79m < required radius ≤ 100m: Use 100m ESE
- If > 100m: Use multiple ESE units (divide area into zones)

Mast height using input parameter: totalPlantAreaM2
- For totalPlantAreaM2 ≤ 10000: Use 6m mast
- For totalPlantAreaM2 > 10000: Use 9m mast
```

#### LA Earth Pits
```
Base quantity = 3 (minimum per IEC 62305-3)
Additional pits using input parameter: totalPlantAreaM2
- For areas > 10000 m²: Add 1 pit per 5000 m²
Rod specification: 3m × Ø16mm copper-bonded steel
Resistance target: < 10 ohms per pit
```

#### Earthing Compound
```
Quantity calculation by system type using input parameters:

For LV Connection:
Total pits = DC earth pits + LA earth pits
Bags required = Total pits × 1 bag (25kg bentonite-graphite mixture)
Final quantity = Bags × 1.2 (20% spare, rounded up)

For HV String Inverter:
Use input parameters: quantityOfIDTs, quantityOfPTs
Total pits = DC earth pits + LA earth pits + (quantityOfIDTs × 4) + (quantityOfPTs × 4 if PTs exist)
Bags required = Total pits × 1 bag
Final quantity = Bags × 1.2 (rounded up)

For HV Central Inverter:
Use input parameters: quantityOfIDTs, quantityOfPTs
Total pits = DC earth pits + LA earth pits + (quantityOfIDTs × 4) + (quantityOfPTs × 4 if PTs exist)
Bags required = Total pits × 1 bag
Final quantity = Bags × 1.2 (rounded up)
```

### 3. AC EARTHING SYSTEM

#### Earth Grid Strip Calculation
```
For LV systems using input parameter: substationElectricalRoomGridSizeM2
Strip length = 4 × √(substationElectricalRoomGridSizeM2) + (8 × rod spacing)
- Standard grid: 30×30m for LV (900 m²)
- Use 50×6mm Cu strip

For HV systems using input parameter: substationElectricalRoomGridSizeM2
Strip length = 4 × √(substationElectricalRoomGridSizeM2) + (12 × rod spacing)
- Standard grid: 40×40m for HV (1600 m²)
- Use 50×6mm or 65×6mm Cu strip based on fault current

Fault current calculation:
If = System MVA / (√3 × System kV) × 1000
Strip cross-section = If × √t / k
where k = 226 for Cu (IEC 60949)
```

#### PE Cable Sizing and Length Calculation

**For LV Connection using input parameters:**
```
Inverter→Combiner PE cable:
Cross-section: Extract runs from acCableCrossSectionInverterToCombinerMm2 (e.g., "1R*70" → 70mm²)
S(PE) = Phase cable cross-section / 2 (round to next higher cross section from the above ## AVAILABLE STANDARD COMPONENTS section -> ### Cable Cross-Sections (mm²))
Minimum = 16 mm²
Length = Use completeCableLengthInverterToCombinerM input parameter directly

Combiner→PoC PE cable:
Cross-section: Extract from acCableCrossSectionCombinerToPoCMm2
S(PE) = Phase cable cross-section / 2 (round to next higher cross section from the above ## AVAILABLE STANDARD COMPONENTS section -> ### Cable Cross-Sections (mm²))
Minimum = 25 mm²
Length = Use completeCableLengthCombinerToPoCM input parameter directly
```

**For HV String Inverter using input parameters:**
```
Inverter→Combiner PE cable:
S(PE) = Extract from acCableCrossSectionInverterToCombinerMm2 / 2 (round to next higher standard size)
Minimum = 16 mm²
Length = Use completeCableLengthInverterToCombinerM input parameter directly

Combiner→IDT PE cable:
S(PE) = Extract from acCableCrossSectionCombinerToIDTMm2 / 2 (round to next higher standard size)
Minimum = 35 mm²
Length = Use completeCableLengthCombinerToIDTM input parameter directly

IDT→PT PE cable (if quantityOfPTs > 0):
S(PE) = Extract from acCableCrossSectionIDTToPTMm2 / 2 (round to next higher standard size)
Minimum = 50 mm²
Length = Use completeCableLengthIDTToPTM input parameter directly

PT→PoC PE cable (if quantityOfPTs > 0):
S(PE) = Extract from acCableCrossSectionPTToPoCMm2 / 2 (round to next higher standard size)
Minimum = 70 mm²
Length = Use completeCableLengthPTToPoCM input parameter directly

If quantityOfPTs = 0 (direct IDT to PoC):
Use IDT output parameters for PoC connection
```

**For HV Central Inverter using input parameters:**
```
Central→IDT PE cable:
S(PE) = Extract from acCableCrossSectionInverterToIDTMm2 / 2 (round to next higher standard size)
Minimum = 70 mm²
Length = Use completeCableLengthInverterToIDTM input parameter directly

IDT→PT PE cable (if quantityOfPTs > 0):
S(PE) = Extract from acCableCrossSectionIDTToPTMm2 / 2 (round to next higher standard size)
Minimum = 95 mm²
Length = Use completeCableLengthIDTToPTM input parameter directly

PT→PoC PE cable (if quantityOfPTs > 0):
S(PE) = Extract from acCableCrossSectionPTToPoCMm2 / 2 (round to next higher standard size)
Minimum = 120 mm²
Length = Use completeCableLengthPTToPoCM input parameter directly
```

### 4. INSTRUMENTATION (CT/PT)

#### Current Transformer Selection

**For LV Connection using input parameters:**
```
At LV Combiner Panel:
Nominal current = Use input parameter: lvCombinerPanelOutputCurrentA
CT Primary = 1.25 × lvCombinerPanelOutputCurrentA (round to next higher rating from CT Ratios)
Protection CTs: 3 nos, 5P10, 10 VA
Metering CTs: 3 nos, 0.5, 10 VA
```

**For HV String Inverter using input parameters:**
```
At each LV Combiner Panel:
Nominal current = Use input parameter: inverterOutputCurrentA
CT Primary = 1.25 × (invertersPerLVCombinerPanel × inverterOutputCurrentA) (round to next higher rating)
Quantity per panel: 3 protection + 3 metering
Total quantity = totalLVCombinerPanels × 6

At IDT (11kV side):
Nominal current = Use input parameter: idtOutputCurrentA
CT Primary = 1.25 × idtOutputCurrentA (round to next higher rating from CT Ratios)
Quantity: quantityOfIDTs × 6 (3 protection + 3 metering)

At PT (if quantityOfPTs > 0, 33kV side):
Nominal current = Use input parameter: ptOutputCurrentA
CT Primary = 1.25 × ptOutputCurrentA (round to next higher rating from CT Ratios)
Quantity: quantityOfPTs × 6 (3 protection + 3 metering)
```

**For HV Central Inverter using input parameters:**
```
At Central Inverter output:
Nominal current = Use input parameter: inverterOutputCurrentA
CT Primary = 1.25 × inverterOutputCurrentA (round to next higher rating from CT Ratios)
Quantity: numberOfCentralInverters × 6

At IDT (both sides):
Input side: Use input parameter idtInputCurrentA
Output side: Use input parameter idtOutputCurrentA
CT Primary = 1.25 × respective currents (round to next higher rating from CT Ratios)
Quantity: quantityOfIDTs × 12 (6 per side)

At PT (if quantityOfPTs > 0, both sides):
Input side: Use input parameter ptInputCurrentA
Output side: Use input parameter ptOutputCurrentA
CT Primary = 1.25 × respective currents (round to next higher rating from CT Ratios)
Quantity: quantityOfPTs × 12 (6 per side)
```

### 5. PROTECTION RELAYS & PANELS

#### Feeder Panel Specifications using input parameters:
```
HV Feeder Panel (11kV) using idtOutputVoltageV:
- Rated voltage: idtOutputVoltageV + 10% = 12kV
- Rated current: Based on idtOutputCurrentA
- Short-circuit rating: 31.5kA for 1s
- Configuration: Single/Double busbar as per redundancy
- Quantity: quantityOfIDTs

HV Feeder Panel (33kV) using ptOutputVoltageV (if quantityOfPTs > 0):
- Rated voltage: ptOutputVoltageV + 10% = 36kV
- Rated current: Based on ptOutputCurrentA
- Short-circuit rating: 31.5kA for 1s
- Configuration: Single busbar
- Quantity: quantityOfPTs
```

### 6. SURGE PROTECTION DEVICES

#### SPD Selection for LV
```
Type 2 SPD specifications:
- Uc = 320V (for 400V system)
- In = 20 kA, Imax = 40 kA
- Up ≤ 1.5 kV

Quantity using input parameters:
- LV Connection: 2 sets (1 per combiner + 1 at PoC)
- HV String: totalLVCombinerPanels + 1
- HV Central: 1 at main panel
```

#### Surge Arresters for HV
```
ZnO Arrester Rating using input parameters:
- For idtOutputVoltageV = 11000V: Ur = 18kV
- For ptOutputVoltageV = 33000V: Ur = 42kV

Quantity using input parameters:
- 3 per transformer winding (one per phase)
- Total = (quantityOfIDTs + quantityOfPTs if > 0) × 3
```

### 7. BUSBAR SIZING using input parameters

#### Busbar Current Rating
```
Incomer current definition by system:

LV Connection:
Incomer current = Use input parameter: lvCombinerPanelOutputCurrentA
Busbar rating = 1.5 × lvCombinerPanelOutputCurrentA

HV String Inverter:
At LV Combiner: Incomer = invertersPerLVCombinerPanel × inverterOutputCurrentA
LV Busbar rating = 1.5 × Incomer current
At HV Panel: Incomer = idtOutputCurrentA or ptOutputCurrentA (if PTs exist)
HV Busbar rating = 1.25 × Incomer current

HV Central Inverter:
At IDT input: Incomer = Use input parameter: idtInputCurrentA
At PT input (if quantityOfPTs > 0): Incomer = Use input parameter: ptInputCurrentA
HV Busbar rating = 1.25 × respective incomer current
```

### 8. TRANSFORMER EARTHING (HV ONLY) using input parameters

**CRITICAL: Only include transformer earthing items if quantityOfIDTs > 0. Skip entirely for LV systems.**

#### Earth Pit Quantity
```
ONLY include these items if quantityOfIDTs > 0:

Per IDT using input parameter: quantityOfIDTs
- Neutral earthing: 2 pits per IDT
- Body earthing: 2 pits per IDT

Per PT using input parameter: quantityOfPTs (if > 0)
- Neutral earthing: 2 pits per PT
- Body earthing: 2 pits per PT

Total = quantityOfIDTs × 4 + (quantityOfPTs × 4 if quantityOfPTs > 0)

If quantityOfIDTs = 0: DO NOT include any transformer earthing items in the BOQ table.
```

---

## OUTPUT FORMAT REQUIREMENTS

Generate BOQ in the following exact format for each item:

```
Description | Specifications | Qty
```

**CRITICAL OUTPUT RULES:**
- Return ONLY the 3-column table with header: `Description | Specifications | Qty`
- No explanatory text, calculations, notes, or commentary
- Each row must have exact specifications following IEC standards
- Quantities must be whole numbers (round up when needed)
- Include proper units (m, Nos, Bags, Lot)

---

## VALIDATION CHECKS

Before finalizing quantities, verify using input parameters:

1. **PE cable cross-section** = Phase cable/2 rounded up to next higher standard size from Cable Cross-Sections list (extracted from acCableCrossSection parameters)
2. **CT primary rating** = 1.25 × Nominal current rounded up to next higher standard rating from CT Ratios list
3. **Earth resistance targets**: Use targetEarthingResistanceOhm parameter
4. **Cable lengths** use completeCableLength parameters directly
5. **Busbar rating** based on actual current parameters (lvCombinerPanelOutputCurrentA, idtInputCurrentA, etc.)
6. **Total earthing compound** accounts for all pits using quantityOfIDTs and quantityOfPTs
7. **Protection relay quantities** match transformer quantities
8. **PT existence** checked: only calculate PT items if quantityOfPTs > 0
9. **Feeder panel quantities** = quantityOfIDTs + quantityOfPTs (if > 0)

---

## CRITICAL PARAMETER USAGE NOTES

**ALWAYS use these exact input parameter names:**
- `totalPlantAreaM2` - for area calculations
- `stringShortCircuitCurrentA` - for DC PE sizing
- `quantityOfIDTs`, `quantityOfPTs` - for transformer-related items
- `completeCableLengthXXXM` - for all cable length calculations
- `acCableCrossSectionXXXMm2` - for extracting cross-sections and runs
- `idtInputCurrentA`, `idtOutputCurrentA` - for IDT CT calculations
- `ptInputCurrentA`, `ptOutputCurrentA` - for PT CT calculations (if PTs exist)
- `lvCombinerPanelOutputCurrentA` - for LV system calculations
- `substationElectricalRoomGridSizeM2` - for earth grid calculations
- `targetEarthingResistanceOhm` - for earthing system design
- `soilType` - for soil resistivity values

**CONDITIONAL LOGIC:**
- PT-related items: Only calculate if `quantityOfPTs > 0`
- System type determines calculation method (LV vs HV String vs HV Central)
- Cable routes vary by system type (check which completeCableLength parameters exist)

---

## ERROR HANDLING

If any parameter is missing or unclear:
1. Check if parameter exists in input (e.g., PT parameters only if quantityOfPTs > 0)
2. Use conservative (higher) values for safety
3. Reference the relevant IEC standard
4. Skip items marked "optional" if dependent parameters are zero/missing

---

Remember: This BOQ must be accurate and complete based ONLY on the provided input parameters. Do not assume or add components not indicated by the inputs. When quantityOfPTs = 0, skip all PT-related calculations and items."##;

/// Per-provider prompt-size soft limits, in estimated tokens. Exceeding one
/// is reported as a warning; the prompt is never truncated.
pub fn soft_token_limit(provider: ProviderKind) -> usize {
    match provider {
        ProviderKind::OpenAi => 12_000,
        ProviderKind::Gemini => 14_000,
    }
}

/// Rough token count at ~4 characters per token, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// An assembled prompt, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptDocument(String);

impl PromptDocument {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for PromptDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Renders the sectioned parameter listing injected into the template.
pub fn format_inputs_block(params: &ParameterSet) -> String {
    let mut out = String::with_capacity(2048);

    out.push_str("# Solar PV BOQ Calculation Parameters\n\n");
    out.push_str(&format!("**System Type:** {}\n", params.calculation_type));
    out.push_str(&format!(
        "**Calculation Date:** {}\n",
        params.extracted_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    ));
    out.push_str(&format!("**Session ID:** {}\n\n", params.session_id));

    let dc = &params.dc;
    out.push_str("## 1. DC Side Inputs\n");
    out.push_str(&format!("- Structure Type: {}\n", dc.structure_type));
    out.push_str(&format!("- Module Width: {}mm\n", dc.module_width_mm));
    out.push_str(&format!("- Module Length: {}mm\n", dc.module_length_mm));
    out.push_str(&format!(
        "- Total Number of Tables: {}\n",
        dc.total_number_of_tables
    ));
    out.push_str(&format!(
        "- Module Layout per Table: {}\n",
        dc.module_layout_per_table
    ));
    if dc.total_number_of_rows > 0 {
        out.push_str(&format!(
            "- Total Number of Rows: {}\n",
            dc.total_number_of_rows
        ));
    }
    out.push_str(&format!(
        "- String Short-circuit Current: {}A\n",
        dc.string_short_circuit_current_a
    ));
    out.push_str(&format!(
        "- Total Strings per Inverter: {}\n",
        dc.total_number_of_strings_per_inverter
    ));
    out.push_str(&format!("- Edge #1 Length: {}m\n", dc.edge1_length_m));
    out.push_str(&format!("- Edge #2 Length: {}m\n", dc.edge2_length_m));
    out.push_str(&format!("- Edge #3 Length: {}m\n", dc.edge3_length_m));
    out.push_str(&format!("- Edge #4 Length: {}m\n\n", dc.edge4_length_m));

    out.push_str("## 2. Lightning Protection Inputs\n");
    out.push_str(&format!(
        "- Total Plant Area: {}m²\n",
        params.lightning.total_plant_area_m2
    ));
    out.push_str(&format!("- Soil Type: {}\n\n", params.lightning.soil_type));

    out.push_str("## 3. AC Side - Common Inputs\n");
    out.push_str(&format!("- System Type: {}\n", params.ac_common.system_type));
    out.push_str(&format!(
        "- Number of Inverters: {}\n\n",
        params.ac_common.number_of_inverters
    ));

    match &params.connection {
        ConnectionInputs::Lv(lv) => {
            out.push_str("## 4. AC Side - LV Connection Type\n");
            out.push_str(&format!(
                "- Inverter Output Voltage: {}V\n",
                lv.inverter_output_voltage_v
            ));
            out.push_str(&format!(
                "- Inverter Output Current: {}A per inverter\n",
                lv.inverter_output_current_a
            ));
            out.push_str("\n### LV Combiner Panel Details:\n");
            out.push_str(&format!(
                "- Number of Inverters Connected to LV Combiner: {}\n",
                lv.inverters_on_lv_combiner
            ));
            out.push_str(&format!(
                "- LV Combiner Panel Output Current: {}A ({} × {}A)\n",
                lv.lv_combiner_output_current_a,
                lv.inverters_on_lv_combiner,
                lv.inverter_output_current_a
            ));
            out.push_str("\n### Cable Details:\n");
            out.push_str(&format!(
                "- Distance Inverter to Combiner: {}m\n",
                lv.inverter_to_combiner.distance_m
            ));
            out.push_str(&format!(
                "- Complete Cable Length Inverter to Combiner: {}m\n",
                lv.inverter_to_combiner.complete_length_m
            ));
            out.push_str(&format!(
                "- AC Cable Cross-section (Inv→Combiner): {}mm²\n",
                lv.inverter_to_combiner.cross_section
            ));
            out.push_str(&format!(
                "- Distance Combiner to PoC: {}m\n",
                lv.combiner_to_poc.distance_m
            ));
            out.push_str(&format!(
                "- Complete Cable Length Combiner to PoC: {}m\n",
                lv.combiner_to_poc.complete_length_m
            ));
            out.push_str(&format!(
                "- AC Cable Cross-section (Combiner→PoC): {}mm²\n",
                lv.combiner_to_poc.cross_section
            ));
            out.push_str("\n### Breaker Details:\n");
            out.push_str(&format!(
                "- Combiner Incomer Breaker Rating: {}A\n",
                lv.combiner_income_breaker_rating_a
            ));
            out.push_str(&format!(
                "- Combiner Outgoing Breaker Rating: {}A\n\n",
                lv.combiner_outgoing_breaker_rating_a
            ));
        }
        ConnectionInputs::HvString(hv) => {
            out.push_str("## 4. AC Side - HV Connection + String Inverter\n");
            out.push_str(&format!(
                "- Number of String Inverters: {}\n",
                hv.number_of_string_inverters
            ));
            out.push_str(&format!(
                "- Inverter Output Voltage: {}V\n",
                hv.inverter_output_voltage_v
            ));
            out.push_str(&format!(
                "- Inverter Output Current: {}A per inverter\n",
                hv.inverter_output_current_a
            ));
            out.push_str(&format!(
                "- Inverters per LV Combiner Panel: {}\n",
                hv.inverters_per_lv_combiner_panel
            ));
            out.push_str(&format!(
                "- Total LV Combiner Panels: {}\n",
                hv.total_lv_combiner_panels
            ));
            out.push_str("\n### IDT Details:\n");
            out.push_str(&format!("- Quantity of IDTs: {}\n", hv.quantity_of_idts));
            out.push_str(&format!("- IDT Input Voltage: {}V\n", hv.idt_input_voltage_v));
            out.push_str(&format!("- IDT Input Current: {}A\n", hv.idt_input_current_a));
            out.push_str(&format!("- IDT Output Voltage: {}V\n", hv.idt_output_voltage_v));
            out.push_str(&format!("- IDT Output Current: {}A\n", hv.idt_output_current_a));
            out.push_str("\n### PT Details:\n");
            out.push_str(&format!("- Quantity of PTs: {}\n", hv.quantity_of_pts));
            out.push_str(&format!("- PT Input Voltage: {}V\n", hv.pt_input_voltage_v));
            out.push_str(&format!("- PT Input Current: {}A\n", hv.pt_input_current_a));
            out.push_str(&format!("- PT Output Voltage: {}V\n", hv.pt_output_voltage_v));
            out.push_str(&format!("- PT Output Current: {}A\n", hv.pt_output_current_a));
            out.push_str("\n### Cable Details:\n");
            push_stage(&mut out, "Inverter to Combiner", &hv.inverter_to_lv_panel);
            push_stage(&mut out, "Combiner to IDT", &hv.lv_panel_to_idt);
            push_stage(&mut out, "IDT to PT", &hv.idt_to_pt);
            push_stage(&mut out, "PT to PoC", &hv.pt_to_poc);
            out.push_str("\n### Breaker Details:\n");
            out.push_str(&format!(
                "- Combiner Incomer Breaker Rating: {}A\n",
                hv.combiner_income_breaker_rating_a
            ));
            out.push_str(&format!(
                "- Combiner Outgoing Breaker Rating: {}A\n",
                hv.combiner_outgoing_breaker_rating_a
            ));
            out.push_str(&format!(
                "- CB IDT to PT: {} {}A\n",
                hv.cb_idt_to_pt.kind, hv.cb_idt_to_pt.rating_a
            ));
            out.push_str(&format!(
                "- CB PT to PoC: {} {}A\n",
                hv.cb_pt_to_poc.kind, hv.cb_pt_to_poc.rating_a
            ));
            out.push_str("\n### Transformer Details:\n");
            out.push_str(&format!(
                "- IDT MVA Rating: {}MVA (Impedance: {}%)\n",
                hv.single_idt_rating_mva, hv.idt_impedance_percent
            ));
            out.push_str(&format!(
                "- PT MVA Rating: {}MVA (Impedance: {}%)\n\n",
                hv.single_pt_rating_mva, hv.pt_impedance_percent
            ));
        }
        ConnectionInputs::HvCentral(hv) => {
            out.push_str("## 4. AC Side - HV Connection + Central Inverter\n");
            out.push_str(&format!(
                "- Number of Central Inverters: {}\n",
                hv.number_of_central_inverters
            ));
            out.push_str(&format!(
                "- Single Inverter Rating: {}kW\n",
                hv.single_inverter_rating_kw
            ));
            out.push_str(&format!(
                "- Inverter Output Voltage: {}V\n",
                hv.inverter_output_voltage_v
            ));
            out.push_str(&format!(
                "- Inverter Output Current: {}A per inverter\n",
                hv.inverter_output_current_a
            ));
            out.push_str("\n### IDT Details:\n");
            out.push_str(&format!("- Quantity of IDTs: {}\n", hv.quantity_of_idts));
            out.push_str(&format!("- IDT Input Voltage: {}V\n", hv.idt_input_voltage_v));
            out.push_str(&format!("- IDT Input Current: {}A\n", hv.idt_input_current_a));
            out.push_str(&format!("- IDT Output Voltage: {}V\n", hv.idt_output_voltage_v));
            out.push_str(&format!("- IDT Output Current: {}A\n", hv.idt_output_current_a));
            out.push_str("\n### PT Details:\n");
            out.push_str(&format!("- Quantity of PTs: {}\n", hv.quantity_of_pts));
            out.push_str(&format!("- PT Input Voltage: {}V\n", hv.pt_input_voltage_v));
            out.push_str(&format!("- PT Input Current: {}A\n", hv.pt_input_current_a));
            out.push_str(&format!("- PT Output Voltage: {}V\n", hv.pt_output_voltage_v));
            out.push_str(&format!("- PT Output Current: {}A\n", hv.pt_output_current_a));
            out.push_str("\n### Cable Details:\n");
            push_stage(&mut out, "Inverter to IDT", &hv.inverter_to_idt);
            push_stage(&mut out, "IDT to PT", &hv.idt_to_pt);
            push_stage(&mut out, "PT to PoC", &hv.pt_to_poc);
            out.push_str("\n### Breaker Details:\n");
            out.push_str(&format!(
                "- CB Inverter to IDT: {} {}A\n",
                hv.cb_inverter_to_idt.kind, hv.cb_inverter_to_idt.rating_a
            ));
            out.push_str(&format!(
                "- CB IDT to PT: {} {}A\n",
                hv.cb_idt_to_pt.kind, hv.cb_idt_to_pt.rating_a
            ));
            out.push_str(&format!(
                "- CB PT to PoC: {} {}A\n",
                hv.cb_pt_to_poc.kind, hv.cb_pt_to_poc.rating_a
            ));
            out.push_str("\n### Transformer Details:\n");
            out.push_str(&format!(
                "- IDT MVA Rating: {}MVA (Impedance: {}%)\n",
                hv.single_idt_rating_mva, hv.idt_impedance_percent
            ));
            out.push_str(&format!(
                "- PT MVA Rating: {}MVA (Impedance: {}%)\n\n",
                hv.single_pt_rating_mva, hv.pt_impedance_percent
            ));
        }
    }

    let grid_side = params.substation.grid_size_m2.sqrt();
    out.push_str("## 7. Substation Inputs\n");
    out.push_str(&format!(
        "- Substation/Electrical Room Grid Size: {}m² ({grid_side}×{grid_side}m)\n",
        params.substation.grid_size_m2
    ));
    out.push_str(&format!(
        "- Target Earthing Resistance: {}Ω\n\n",
        params.substation.target_earthing_resistance_ohms
    ));

    let prefs = &params.fixed_preferences;
    out.push_str("## 8. Fixed Preferences\n");
    out.push_str(&format!(
        "- String Side Protective Device: {}\n",
        prefs.string_side_protective_device
    ));
    out.push_str(&format!("- Preferred Material: {}\n", prefs.preferred_material));
    out.push_str(&format!(
        "- Preferred Insulation of Earthing Cables: {}\n",
        prefs.preferred_insulation_of_earthing_cables
    ));
    out.push_str(&format!("- Rail Bonding Mode: {}\n", prefs.rail_bonding_mode));
    out.push_str(&format!(
        "- Structure Drop Rule: {}\n\n",
        prefs.structure_drop_rule
    ));

    if let Some(earthing) = &params.transformer_earthing {
        out.push_str("## 9. Transformer Earthing Inputs (HV Systems Only)\n");
        out.push_str(&format!("- Number of IDTs: {}\n", earthing.number_of_idts));
        out.push_str(&format!("- Number of PTs: {}\n", earthing.number_of_pts));
        out.push_str(&format!("- Transformer Earthing: {}\n\n", earthing.scheme));
    }

    out
}

fn push_stage(out: &mut String, label: &str, stage: &crate::domain::parameters::CableStage) {
    out.push_str(&format!("- Distance {label}: {}m\n", stage.distance_m));
    out.push_str(&format!(
        "- Complete Cable Length {label}: {}m\n",
        stage.complete_length_m
    ));
    out.push_str(&format!(
        "- AC Cable Cross-section ({label}): {}mm²\n",
        stage.cross_section
    ));
}

/// Builds the final prompt. Pure; byte-identical output for identical input.
pub fn assemble(params: &ParameterSet) -> PromptDocument {
    let inputs = format_inputs_block(params).replace("\r\n", "\n");
    PromptDocument(MASTER_TEMPLATE.replacen(INPUTS_PLACEHOLDER, &inputs, 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parameters::CalculationType;
    use crate::domain::snapshot::DesignSnapshot;
    use crate::extract::ExtractionSession;

    fn hv_params() -> ParameterSet {
        let mut session = ExtractionSession::new();
        let snapshot = DesignSnapshot {
            manual_inverter_count: Some(12),
            ..Default::default()
        };
        session
            .extract_all(&snapshot, CalculationType::HvString)
            .unwrap();
        session.complete(CalculationType::HvString).unwrap()
    }

    #[test]
    fn assembly_is_idempotent() {
        let params = hv_params();
        let first = assemble(&params);
        let second = assemble(&params);
        assert_eq!(first.as_str(), second.as_str());
    }

    #[test]
    fn inputs_block_is_injected_exactly_once() {
        let params = hv_params();
        let prompt = assemble(&params);
        assert!(!prompt.as_str().contains(INPUTS_PLACEHOLDER));
        assert!(prompt.as_str().contains("## 1. DC Side Inputs"));
        assert!(prompt.as_str().contains("## 9. Transformer Earthing Inputs"));
        assert!(prompt.as_str().contains("CALCULATION RULES"));
    }

    #[test]
    fn central_inverter_sets_carry_transformer_earthing_section() {
        let mut session = ExtractionSession::new();
        let snapshot = DesignSnapshot::default();
        session.extract_dc(&snapshot);
        session.extract_lightning(&snapshot);
        session.extract_ac_common(&snapshot);
        session.extract_hv_central(&snapshot);
        let params = session.complete(CalculationType::HvCentral).unwrap();
        let block = format_inputs_block(&params);
        assert!(block.contains("## 4. AC Side - HV Connection + Central Inverter"));
        assert!(block.contains("## 9. Transformer Earthing Inputs (HV Systems Only)"));
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
