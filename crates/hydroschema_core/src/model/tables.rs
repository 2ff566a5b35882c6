//! Declared table model at the head of the migration chain.
//!
//! The descriptor is deliberately plain data: table name plus column
//! name/type tuples. Row copies and spatial-index maintenance iterate it
//! instead of reflecting over ORM classes.

/// Geometry kind of a spatial column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryType {
    Point,
    LineString,
    Polygon,
}

impl GeometryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Point => "POINT",
            Self::LineString => "LINESTRING",
            Self::Polygon => "POLYGON",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub geometry: Option<GeometryType>,
}

impl ColumnDescriptor {
    pub const fn plain(name: &'static str, sql_type: &'static str) -> Self {
        Self {
            name,
            sql_type,
            geometry: None,
        }
    }

    pub const fn geometry(name: &'static str, kind: GeometryType) -> Self {
        Self {
            name,
            sql_type: "BLOB",
            geometry: Some(kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: &'static str,
    pub columns: &'static [ColumnDescriptor],
}

impl TableDescriptor {
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|column| column.name)
    }

    pub fn geometry_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> + '_ {
        self.columns.iter().filter(|column| column.geometry.is_some())
    }
}

use ColumnDescriptor as Col;

const MODEL_SETTINGS: &[ColumnDescriptor] = &[
    Col::plain("id", "INTEGER"),
    Col::plain("name", "VARCHAR(128)"),
    Col::plain("sim_time_step", "REAL"),
    Col::plain("dem_file", "VARCHAR(255)"),
    Col::plain("use_2d_flow", "BOOLEAN"),
    Col::plain("numerical_settings_id", "INTEGER"),
];

const NUMERICAL_SETTINGS: &[ColumnDescriptor] = &[
    Col::plain("id", "INTEGER"),
    Col::plain("max_degree_gauss_seidel", "INTEGER"),
    Col::plain("friction_shallow_water_depth_correction", "INTEGER"),
    Col::plain("use_nested_newton", "INTEGER"),
];

const CONNECTION_NODES: &[ColumnDescriptor] = &[
    Col::plain("id", "INTEGER"),
    Col::plain("code", "VARCHAR(100)"),
    Col::plain("storage_area", "REAL"),
    Col::plain("initial_waterlevel", "REAL"),
    Col::geometry("the_geom", GeometryType::Point),
];

const MANHOLE: &[ColumnDescriptor] = &[
    Col::plain("id", "INTEGER"),
    Col::plain("display_name", "VARCHAR(255)"),
    Col::plain("code", "VARCHAR(100)"),
    Col::plain("connection_node_id", "INTEGER"),
    Col::plain("bottom_level", "REAL"),
    Col::plain("surface_level", "REAL"),
];

const CHANNEL: &[ColumnDescriptor] = &[
    Col::plain("id", "INTEGER"),
    Col::plain("display_name", "VARCHAR(255)"),
    Col::plain("code", "VARCHAR(100)"),
    Col::plain("calculation_type", "INTEGER"),
    Col::plain("connection_node_start_id", "INTEGER"),
    Col::plain("connection_node_end_id", "INTEGER"),
    Col::geometry("the_geom", GeometryType::LineString),
];

const CROSS_SECTION_LOCATION: &[ColumnDescriptor] = &[
    Col::plain("id", "INTEGER"),
    Col::plain("code", "VARCHAR(100)"),
    Col::plain("reference_level", "REAL"),
    Col::plain("friction_type", "INTEGER"),
    Col::plain("friction_value", "TEXT"),
    Col::plain("bank_level", "REAL"),
    Col::plain("channel_id", "INTEGER"),
    Col::geometry("the_geom", GeometryType::Point),
    Col::plain("vegetation_stem_density", "REAL"),
    Col::plain("vegetation_stem_diameter", "REAL"),
    Col::plain("vegetation_height", "REAL"),
    Col::plain("vegetation_drag_coefficient", "REAL"),
    Col::plain("friction_values", "TEXT"),
    Col::plain("vegetation_stem_densities", "TEXT"),
    Col::plain("vegetation_stem_diameters", "TEXT"),
    Col::plain("vegetation_heights", "TEXT"),
    Col::plain("vegetation_drag_coefficients", "TEXT"),
];

/// Tables present at the chain head, in foreign-key-safe copy order.
pub const DECLARED_MODELS: &[TableDescriptor] = &[
    TableDescriptor {
        name: "numerical_settings",
        columns: NUMERICAL_SETTINGS,
    },
    TableDescriptor {
        name: "model_settings",
        columns: MODEL_SETTINGS,
    },
    TableDescriptor {
        name: "v2_connection_nodes",
        columns: CONNECTION_NODES,
    },
    TableDescriptor {
        name: "v2_manhole",
        columns: MANHOLE,
    },
    TableDescriptor {
        name: "v2_channel",
        columns: CHANNEL,
    },
    TableDescriptor {
        name: "v2_cross_section_location",
        columns: CROSS_SECTION_LOCATION,
    },
];
